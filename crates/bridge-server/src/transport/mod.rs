//! Engine transports.
//!
//! One [`EngineTransport`] trait with three implementations, picked at
//! startup by [`connectors_for_platform`]:
//!
//! - [`socket`]: TCP scripting port advertised through a discovery file.
//! - [`shared_memory`]: named buffer + mutex + request/result events (Windows).
//! - [`dde`]: `Vivarium` DDE conversation of first-generation engines (Windows).
//!
//! Transports are blocking and not safe for concurrent use; the session actor
//! is their only caller.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use bridge_core::{
    DiscoveryError, DiscoveryState, EngineFamily, EngineInfo, FaultClass, TransportError,
    VERSION_QUERY,
};
use bridge_protocol::text_codec;

use crate::config::Config;
use crate::session::EngineSession;

pub mod dde;
pub mod shared_memory;
pub mod socket;

#[cfg(windows)]
mod win32;

/// Bounded retries of a would-block failure.
pub const MAX_TRANSIENT_RETRIES: u32 = 5;

const TRANSIENT_BACKOFF: Duration = Duration::from_millis(10);

/// Raw reply of one exchange, still in the legacy encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReply {
    Text(Vec<u8>),
    Binary(Vec<u8>),
}

pub trait EngineTransport: Send {
    fn family(&self) -> EngineFamily;

    /// Largest unit accepted in one exchange. `None` sends messages unsplit.
    fn unit_limit(&self) -> Option<usize>;

    /// Send every unit of one message in order and return the concatenated
    /// reply. A fatal error leaves the transport closed.
    fn send_units(&mut self, units: &[&[u8]]) -> Result<EngineReply, TransportError>;

    /// True once the engine is known to be gone.
    fn is_closed(&mut self) -> bool;

    fn working_directory(&self) -> Option<PathBuf> {
        None
    }

    /// Identify the engine right after connecting.
    fn handshake(&mut self) -> Result<EngineInfo, DiscoveryError> {
        let query = text_codec::from_utf8(VERSION_QUERY.as_bytes());
        let reply = match self.send_units(&[query.as_slice()])? {
            EngineReply::Text(bytes) | EngineReply::Binary(bytes) => text_codec::to_utf8(&bytes),
        };
        EngineInfo::from_version_reply(self.family(), &reply, self.working_directory())
    }
}

/// Finds a running engine of one family.
pub trait EngineConnector: Send {
    fn name(&self) -> &'static str;

    /// `Ok(None)` is a discovery miss: nothing reachable right now.
    fn discover(&mut self, state: &mut DiscoveryState) -> Result<Option<EngineSession>, DiscoveryError>;
}

/// Run `op`, retrying would-block failures a bounded number of times and a
/// timeout exactly once.
pub fn with_retries<T, F>(mut op: F) -> Result<T, TransportError>
where
    F: FnMut() -> Result<T, TransportError>,
{
    let mut transient = 0;
    let mut timeouts = 0;

    loop {
        match op() {
            Err(err) if err.class() == FaultClass::Transient && transient < MAX_TRANSIENT_RETRIES => {
                transient += 1;
                thread::sleep(TRANSIENT_BACKOFF);
            }
            Err(err) if err.class() == FaultClass::Timeout && timeouts == 0 => {
                timeouts += 1;
                tracing::debug!("engine timed out, retrying once");
            }
            other => return other,
        }
    }
}

/// Try every connector in order; the first live session wins.
pub fn discover_any(
    connectors: &mut [Box<dyn EngineConnector>],
    state: &mut DiscoveryState,
) -> Option<EngineSession> {
    for connector in connectors.iter_mut() {
        match connector.discover(state) {
            Ok(Some(session)) => return Some(session),
            Ok(None) => tracing::debug!(connector = connector.name(), "no engine found"),
            Err(err) => tracing::warn!(connector = connector.name(), "engine discovery failed: {err}"),
        }
    }
    None
}

/// Connectors available on this platform, in probing order.
pub fn connectors_for_platform(config: &Config) -> Vec<Box<dyn EngineConnector>> {
    let mut connectors: Vec<Box<dyn EngineConnector>> = Vec::new();

    #[cfg(windows)]
    {
        connectors.push(Box::new(dde::DdeConnector::new(win32::Win32DdeClient::default())));
        connectors.push(Box::new(shared_memory::SharedMemoryConnector::new(
            win32::Win32ChannelOpener::new(config.receive_timeout()),
        )));
    }

    match config.discovery_path() {
        Some(path) => connectors.push(Box::new(socket::SocketConnector::new(
            path,
            config.engine_host,
            config.connect_timeout(),
            config.receive_timeout(),
        ))),
        None => tracing::warn!("no home directory; socket discovery disabled"),
    }

    connectors
}
