//! Discovery / reconnect policy.
//!
//! The discovery channel (for the socket transport: a file naming the port)
//! is only re-examined when its modification time changes. After a broken
//! pipe the engine is usually still alive on the same port, so the session
//! arms a one-shot reconnect that forces a single attempt even though the
//! timestamp did not move.
//!
//! The state is owned by the poll loop and passed into every discovery call;
//! there is no process-wide flag.

use std::time::SystemTime;

/// What the connector should do with the current discovery stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryDecision {
    /// Unchanged since the last successful discovery; do nothing.
    Skip,

    /// The channel changed (or was never seen); re-read it and connect.
    Fresh,

    /// Unchanged, but a reconnect was armed; retry the cached endpoint once.
    ForcedReconnect,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryState {
    last_stamp: Option<SystemTime>,
    reconnect_armed: bool,
}

impl DiscoveryState {
    pub fn new() -> Self {
        DiscoveryState::default()
    }

    /// Decide how to treat `stamp`. Consumes an armed reconnect whatever the
    /// outcome of the attempt that follows.
    pub fn decide(&mut self, stamp: SystemTime) -> DiscoveryDecision {
        let armed = std::mem::take(&mut self.reconnect_armed);

        if self.last_stamp != Some(stamp) {
            DiscoveryDecision::Fresh
        } else if armed {
            DiscoveryDecision::ForcedReconnect
        } else {
            DiscoveryDecision::Skip
        }
    }

    /// Remember the stamp of a discovery that produced a live session.
    pub fn record_success(&mut self, stamp: SystemTime) {
        self.last_stamp = Some(stamp);
    }

    pub fn arm_reconnect(&mut self) {
        self.reconnect_armed = true;
    }

    pub fn is_reconnect_armed(&self) -> bool {
        self.reconnect_armed
    }

    pub fn last_stamp(&self) -> Option<SystemTime> {
        self.last_stamp
    }
}
