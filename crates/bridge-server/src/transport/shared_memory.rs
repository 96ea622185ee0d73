//! Shared-memory transport.
//!
//! Each engine publishes `<name>_mem`, `<name>_mutex`, `<name>_request` and
//! `<name>_result`. The buffer starts with a fixed header:
//!
//! ```text
//! offset 0   "c2e@"
//! offset 4   pid of the engine            u32
//! offset 8   result code                  i32
//! offset 12  byte length of the contents  u32
//! offset 16  total buffer size            u32
//! offset 20  padding                      u32
//! offset 24  contents, NUL terminated
//! ```
//!
//! A request is written under the mutex, the request event is pulsed and the
//! reply is read back once the result event fires.

use std::path::PathBuf;

use bridge_core::{DiscoveryError, DiscoveryState, EngineFamily, TransportError};
use bridge_protocol::wire_types::{EXECUTE_PREFIX, SCRIPT_INSTALL_PREFIX};
use tracing::debug;

use super::{EngineConnector, EngineReply, EngineTransport};
use crate::session::EngineSession;

/// Size of the buffer header in front of the contents.
pub const HEADER_LEN: usize = 24;

/// Engines probed in order.
pub const ENGINE_NAMES: [&str; 7] = [
    "Creatures Village",
    "Creatures Playground",
    "Creatures 3",
    "Docking Station",
    "Edynn",
    "Sea Monkeys",
    "Creatures Evolution Engine",
];

/// Access to one engine's shared buffer and its synchronisation objects.
pub trait SharedChannel: Send {
    /// Acquire the engine mutex.
    fn lock(&mut self) -> Result<(), TransportError>;

    fn unlock(&mut self);

    /// Bytes available for contents (buffer size minus header).
    fn capacity(&self) -> usize;

    /// Write `request`, signal the engine and wait for its reply.
    /// Returns `EngineExited` if the engine process ends while waiting.
    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Whether the process that created the buffer is still running.
    fn creator_alive(&mut self) -> bool;

    fn working_directory(&self) -> Option<PathBuf> {
        None
    }
}

/// Opens the named channel of a running engine.
pub trait ChannelOpener: Send {
    type Channel: SharedChannel + 'static;

    /// `Ok(None)` when no engine of that name is running.
    fn open(&mut self, name: &str) -> Result<Option<Self::Channel>, TransportError>;
}

pub struct SharedMemoryTransport<C> {
    channel: C,
    closed: bool,
}

impl<C: SharedChannel> SharedMemoryTransport<C> {
    pub fn new(channel: C) -> Self {
        SharedMemoryTransport {
            channel,
            closed: false,
        }
    }

    fn exchange_all(&mut self, units: &[&[u8]]) -> Result<Vec<u8>, TransportError> {
        let mut reply = Vec::new();
        let mut request = Vec::new();

        for unit in units {
            request.clear();
            if !is_script_install(unit) {
                request.extend_from_slice(EXECUTE_PREFIX);
            }
            request.extend_from_slice(unit);

            reply.extend_from_slice(&self.channel.transact(&request)?);
        }

        Ok(reply)
    }
}

fn is_script_install(unit: &[u8]) -> bool {
    unit.trim_ascii_start().starts_with(SCRIPT_INSTALL_PREFIX)
}

impl<C: SharedChannel> EngineTransport for SharedMemoryTransport<C> {
    fn family(&self) -> EngineFamily {
        EngineFamily::SharedMemory
    }

    /// Room for the `execute\n` prefix and the terminating NUL.
    fn unit_limit(&self) -> Option<usize> {
        Some(self.channel.capacity().saturating_sub(EXECUTE_PREFIX.len() + 1))
    }

    fn send_units(&mut self, units: &[&[u8]]) -> Result<EngineReply, TransportError> {
        if self.is_closed() {
            return Err(TransportError::EngineExited);
        }
        if units.iter().all(|unit| unit.is_empty()) {
            return Ok(EngineReply::Text(Vec::new()));
        }

        self.channel.lock()?;
        let result = self.exchange_all(units);
        self.channel.unlock();

        match result {
            Ok(reply) => Ok(EngineReply::Text(reply)),
            Err(err) => {
                if err.is_fatal() {
                    self.closed = true;
                }
                Err(err)
            }
        }
    }

    fn is_closed(&mut self) -> bool {
        if !self.closed && !self.channel.creator_alive() {
            self.closed = true;
        }
        self.closed
    }

    fn working_directory(&self) -> Option<PathBuf> {
        self.channel.working_directory()
    }
}

/// Probes every known engine name for a shared buffer.
pub struct SharedMemoryConnector<O> {
    opener: O,
    names: Vec<String>,
}

impl<O: ChannelOpener> SharedMemoryConnector<O> {
    pub fn new(opener: O) -> Self {
        SharedMemoryConnector::with_names(opener, ENGINE_NAMES.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_names(opener: O, names: Vec<String>) -> Self {
        SharedMemoryConnector { opener, names }
    }
}

impl<O: ChannelOpener> EngineConnector for SharedMemoryConnector<O> {
    fn name(&self) -> &'static str {
        "shared-memory"
    }

    fn discover(&mut self, _state: &mut DiscoveryState) -> Result<Option<EngineSession>, DiscoveryError> {
        for name in &self.names {
            let channel = match self.opener.open(name) {
                Ok(Some(channel)) => channel,
                Ok(None) => continue,
                Err(err) => {
                    debug!(engine = %name, "failed to open shared memory: {err}");
                    continue;
                }
            };

            debug!(engine = %name, "found shared memory");
            return EngineSession::attach(Box::new(SharedMemoryTransport::new(channel))).map(Some);
        }

        Ok(None)
    }
}
