//! Error types shared by every engine transport.
//!
//! [`TransportError`] is the per-I/O-attempt taxonomy. Each variant maps to a
//! [`FaultClass`] that tells the session what to do next: retry in place,
//! give up on this request only, tear the transport down, or terminate the
//! session because an invariant was broken.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single transport operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("operation would block")]
    WouldBlock,

    #[error("Connection reset by host")]
    ConnectionReset,

    /// Peer went away mid-write. Arms one forced reconnect.
    #[error("Connection reset by peer")]
    BrokenPipe,

    #[error("Caught signal")]
    Interrupted,

    #[error("timed out waiting for the engine")]
    Timeout,

    #[error("Connection refused")]
    Refused,

    #[error("No out of band data available")]
    InvalidInput,

    #[error("socket not a valid file descriptor")]
    InvalidHandle,

    #[error("socket not a socket")]
    NotASocket,

    #[error("socket not connected")]
    NotConnected,

    #[error("flags not supported")]
    UnsupportedFlag,

    /// The transport was already marked closed by an earlier failure.
    #[error("Port is not open.")]
    NotOpen,

    #[error("Engine is closed.")]
    EngineExited,

    #[error("Failed to lock engine mutex. ({0})")]
    Lock(String),

    #[error("message is too long! {len} vs {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("{0}")]
    Other(String),
}

/// How a [`TransportError`] is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Ignorable; retry the same operation a bounded number of times.
    Transient,

    /// Not fatal; exactly one extra receive attempt before giving up.
    Timeout,

    /// The request fails but the transport stays usable.
    Rejected,

    /// Transport permanently dead.
    Fatal { reconnect: bool },

    /// Should never happen in normal operation; terminates the session.
    Invariant,
}

impl TransportError {
    pub fn class(&self) -> FaultClass {
        match self {
            TransportError::WouldBlock => FaultClass::Transient,
            TransportError::Timeout => FaultClass::Timeout,
            TransportError::Lock(_) | TransportError::TooLong { .. } => FaultClass::Rejected,
            TransportError::BrokenPipe => FaultClass::Fatal { reconnect: true },
            TransportError::ConnectionReset
            | TransportError::Interrupted
            | TransportError::Refused
            | TransportError::InvalidInput
            | TransportError::NotOpen
            | TransportError::EngineExited
            | TransportError::Other(_) => FaultClass::Fatal { reconnect: false },
            TransportError::InvalidHandle
            | TransportError::NotASocket
            | TransportError::NotConnected
            | TransportError::UnsupportedFlag => FaultClass::Invariant,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), FaultClass::Fatal { .. } | FaultClass::Invariant)
    }

    /// True when this failure should force one reconnect attempt even if the
    /// discovery channel looks unchanged.
    pub fn wants_reconnect(&self) -> bool {
        self.class() == FaultClass::Fatal { reconnect: true }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        if let Some(errno_fault) = err.raw_os_error().and_then(classify_errno) {
            return errno_fault;
        }

        match err.kind() {
            io::ErrorKind::WouldBlock => TransportError::WouldBlock,
            io::ErrorKind::TimedOut => TransportError::Timeout,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                TransportError::ConnectionReset
            }
            io::ErrorKind::BrokenPipe => TransportError::BrokenPipe,
            io::ErrorKind::Interrupted => TransportError::Interrupted,
            io::ErrorKind::ConnectionRefused => TransportError::Refused,
            io::ErrorKind::NotConnected => TransportError::NotConnected,
            io::ErrorKind::InvalidInput => TransportError::InvalidInput,
            _ => TransportError::Other(err.to_string()),
        }
    }
}

#[cfg(unix)]
fn classify_errno(code: i32) -> Option<TransportError> {
    match code {
        libc::EBADF => Some(TransportError::InvalidHandle),
        libc::ENOTSOCK => Some(TransportError::NotASocket),
        libc::EOPNOTSUPP => Some(TransportError::UnsupportedFlag),
        libc::ENOTCONN => Some(TransportError::NotConnected),
        libc::EINVAL => Some(TransportError::InvalidInput),
        _ => None,
    }
}

#[cfg(not(unix))]
fn classify_errno(_code: i32) -> Option<TransportError> {
    None
}

/// Why discovery produced no session even though an engine seemed present.
///
/// A plain miss (nothing listening, no discovery file) is not an error and is
/// reported as `Ok(None)` by the connectors instead.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read discovery file {path}: {reason}")]
    DiscoveryFile { path: PathBuf, reason: String },

    #[error("engine handshake failed: {0}")]
    Handshake(String),

    #[error("engine transport failed during handshake: {0}")]
    Transport(#[from] TransportError),
}
