//! In-band relay directives emitted by engine scripts.
//!
//! Recognized forms:
//!
//! ```text
//! ws://host:port[protocol]
//! ws://host:port[protocol]:message
//! wss://host:port[protocol]:message
//! ws[protocol]:message
//! ```
//!
//! The short form has no host, so it only reaches peers already tracked
//! under `protocol`.

/// A parsed directive line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directive {
    pub secure: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: String,
    pub message: Option<String>,
}

impl Directive {
    /// An empty subprotocol cannot be routed even though the prefix matched.
    pub fn is_routable(&self) -> bool {
        !self.protocol.is_empty()
    }

    /// Relay URL for the outbound connection, when the directive names a host.
    pub fn url(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let scheme = if self.secure { "wss" } else { "ws" };
        Some(match self.port {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        })
    }
}

/// Parse one line of engine output. `None` means the line is not a directive.
pub fn parse_directive(line: &str) -> Option<Directive> {
    if let Some(rest) = line.strip_prefix("wss://") {
        return Some(parse_long_form(rest, true));
    }
    if let Some(rest) = line.strip_prefix("ws://") {
        return Some(parse_long_form(rest, false));
    }
    if let Some(rest) = line.strip_prefix("wss[") {
        return Some(parse_short_form(rest, true));
    }
    if let Some(rest) = line.strip_prefix("ws[") {
        return Some(parse_short_form(rest, false));
    }
    None
}

fn parse_long_form(rest: &str, secure: bool) -> Directive {
    let address_end = rest.find('[').unwrap_or(rest.len());
    let (address, tail) = rest.split_at(address_end);

    let (host, port) = match address.split_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok()),
        None => (address, None),
    };

    let mut directive = match tail.strip_prefix('[') {
        Some(bracketed) => parse_short_form(bracketed, secure),
        None => Directive {
            secure,
            ..Directive::default()
        },
    };

    if !host.is_empty() {
        directive.host = Some(host.to_string());
    }
    directive.port = port;
    directive
}

/// `rest` starts just after the opening `[`.
fn parse_short_form(rest: &str, secure: bool) -> Directive {
    let Some((protocol, tail)) = rest.split_once(']') else {
        return Directive {
            secure,
            ..Directive::default()
        };
    };

    let message = tail
        .strip_prefix(':')
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Directive {
        secure,
        host: None,
        port: None,
        protocol: protocol.to_string(),
        message,
    }
}
