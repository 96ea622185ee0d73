//! Engine identity obtained during the one-time handshake.

use std::fmt;
use std::path::PathBuf;

use crate::error::DiscoveryError;

/// Command sent right after connecting to a scripting-socket or
/// shared-memory engine. The reply looks like `2 286 "Docking Station"`.
pub const VERSION_QUERY: &str = "outv vmjr outs \" \" outv vmnr outs \" \" outx gnam";

/// Highest major version reported by the first-generation DDE engine.
pub const FIRST_GENERATION_MAX_MAJOR: i32 = 20;

/// Protocol family of the attached engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineFamily {
    /// TCP scripting socket advertised through the discovery file.
    Socket,

    /// Named shared-memory buffer guarded by a mutex and two events.
    SharedMemory,

    /// DDE conversation with the `Vivarium` service.
    Dde,
}

impl EngineFamily {
    /// Engine label used in status broadcasts.
    pub fn label(self) -> &'static str {
        match self {
            EngineFamily::Socket | EngineFamily::SharedMemory => "C2E",
            EngineFamily::Dde => "Vivarium",
        }
    }
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Attach / detach notifications broadcast to every tracked peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Opened,
    Closed,
}

impl StatusEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusEvent::Opened => "OnGameOpened",
            StatusEvent::Closed => "OnGameClosed",
        }
    }
}

/// Identity metadata of one attached engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub family: EngineFamily,
    pub version_major: i32,
    pub version_minor: i32,
    pub name: String,
    pub working_directory: Option<PathBuf>,
}

impl EngineInfo {
    /// Build the identity from the reply to [`VERSION_QUERY`].
    pub fn from_version_reply(
        family: EngineFamily,
        reply: &str,
        working_directory: Option<PathBuf>,
    ) -> Result<Self, DiscoveryError> {
        let (version_major, version_minor, name) = parse_version_reply(reply)
            .ok_or_else(|| DiscoveryError::Handshake(format!("unexpected version reply: {reply:?}")))?;

        Ok(EngineInfo {
            family,
            version_major,
            version_minor,
            name,
            working_directory,
        })
    }

    pub fn is_dde(&self) -> bool {
        self.family == EngineFamily::Dde
    }

    /// First-generation DDE engine: `[...]` strings and no repeated whitespace.
    pub fn is_first_generation(&self) -> bool {
        self.is_dde() && self.version_major <= FIRST_GENERATION_MAX_MAJOR
    }

    /// `OnGameOpened C2E 2.286 Docking Station`
    pub fn status_line(&self, event: StatusEvent) -> String {
        format!(
            "{} {} {}.{} {}",
            event.as_str(),
            self.family,
            self.version_major,
            self.version_minor,
            self.name
        )
    }
}

/// Parse `<major> <minor> "<name>"`.
///
/// The closing quote is optional; an empty name is rejected.
pub fn parse_version_reply(reply: &str) -> Option<(i32, i32, String)> {
    let (major, rest) = take_int(reply)?;
    let (minor, rest) = take_int(rest)?;

    let rest = rest.trim_start().strip_prefix('"')?;
    let rest = rest.trim_start_matches('"');
    let name = match rest.find('"') {
        Some(end) => &rest[..end],
        None => rest,
    };

    if name.is_empty() {
        return None;
    }

    Some((major, minor, name.to_string()))
}

fn take_int(s: &str) -> Option<(i32, &str)> {
    let s = s.trim_start();
    let sign_len = usize::from(s.starts_with('-') || s.starts_with('+'));
    let digits = s[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();

    if digits == 0 {
        return None;
    }

    let end = sign_len + digits;
    let value = s[..end].parse::<i32>().ok()?;
    Some((value, &s[end..]))
}
