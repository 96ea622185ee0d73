//! Engine replies as seen by the rest of the gateway.
//!
//! Every transport operation ends in a [`Response`]. Transport failures are
//! folded into responses with `is_error` set instead of being propagated, so
//! nothing past the session boundary has to handle transport errors.

use std::borrow::Cow;

/// Body of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text (already converted from the engine's legacy encoding).
    Text(String),

    /// Raw bytes, forwarded to websocket peers as a binary frame.
    Binary(Vec<u8>),
}

/// Immutable reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub payload: Payload,
    pub is_error: bool,
}

impl Response {
    /// Successful text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Response {
            payload: Payload::Text(text.into()),
            is_error: false,
        }
    }

    /// Successful binary reply.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Response {
            payload: Payload::Binary(bytes.into()),
            is_error: false,
        }
    }

    /// Error reply carrying a human readable reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Response {
            payload: Payload::Text(reason.into()),
            is_error: true,
        }
    }

    /// Empty successful reply (nothing is sent back to the peer).
    pub fn empty() -> Self {
        Response::text(String::new())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.payload, Payload::Binary(_))
    }

    pub fn is_empty(&self) -> bool {
        match &self.payload {
            Payload::Text(t) => t.is_empty(),
            Payload::Binary(b) => b.is_empty(),
        }
    }

    /// Text view of the payload. Binary payloads are decoded lossily.
    pub fn as_text(&self) -> Cow<'_, str> {
        match &self.payload {
            Payload::Text(t) => Cow::Borrowed(t.as_str()),
            Payload::Binary(b) => String::from_utf8_lossy(b),
        }
    }
}
