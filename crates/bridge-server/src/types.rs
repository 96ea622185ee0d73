//! Shared types for the bridge server.
//!
//! This module defines:
//! - `PeerId`: a lightweight handle for tracked websocket peers
//! - `PeerFrame`: what a peer's writer task puts on the wire
//! - channel aliases between the gateway, peers and the session actor

use std::sync::atomic::{AtomicU64, Ordering};

use bridge_core::Response;
use tokio::sync::{mpsc, oneshot};

/// Identifier of a tracked peer (inbound client or outbound relay).
///
/// Unique over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_peer_id() -> PeerId {
    PeerId(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
}

/// One outbound websocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Close the connection after sending this frame.
    Close { code: u16, reason: String },
}

/// Close code sent when the engine answered with an error.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Outbound frames to a given peer, drained by its writer task.
pub type OutboundTx = mpsc::UnboundedSender<PeerFrame>;
pub type OutboundRx = mpsc::UnboundedReceiver<PeerFrame>;

/// Result of a keep-alive probe of the attached engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// The engine is gone; the session must be detached.
    pub closed: bool,

    /// Discovery should retry the same endpoint once even if unchanged.
    pub reconnect: bool,

    /// Reply to the probe command, if one was sent.
    pub output: Option<Response>,
}

/// Message flowing into the session actor.
#[derive(Debug)]
pub enum SessionCommand {
    Send {
        text: String,
        reply: oneshot::Sender<Response>,
    },
    Probe {
        command: Option<String>,
        reply: oneshot::Sender<ProbeOutcome>,
    },
    Shutdown,
}

/// Channel into the session actor.
pub type SessionTx = mpsc::UnboundedSender<SessionCommand>;
pub type SessionRx = mpsc::UnboundedReceiver<SessionCommand>;
