//! DDE transport for first-generation engines.
//!
//! The engine is a DDE server with service `Vivarium`. A script is poked into
//! the `NornSockets` conversation and its output requested back through the
//! `Macro` item. There is no version query; `dde: putv vrsn` yields the
//! major version only.

use std::path::PathBuf;

use bridge_core::{
    DiscoveryError, DiscoveryState, EngineFamily, EngineInfo, TransportError,
};
use tracing::debug;

use super::{EngineConnector, EngineReply, EngineTransport};
use crate::session::EngineSession;

pub const SERVICE: &str = "Vivarium";
pub const TOPIC: &str = "NornSockets";
pub const MACRO_ITEM: &str = "Macro";
pub const BRAIN_ACTIVITY_ITEM: &str = "BrainActivity";

/// Macro whose output is the engine's major version.
pub const VERSION_MACRO: &[u8] = b"dde: putv vrsn";

/// Command answered with the raw `BrainActivity` item.
pub const BRAIN_DUMP: &[u8] = b"BRAIN DUMP";

/// Client side of the `Vivarium` conversation.
///
/// Methods return `Ok(None)` when no conversation could be established.
pub trait DdeClient: Send {
    fn execute_macro(&mut self, script: &[u8]) -> Result<Option<Vec<u8>>, TransportError>;

    fn brain_activity(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Pid of the engine on the other end of the conversation.
    fn partner_pid(&mut self) -> Option<u32>;

    fn process_running(&mut self, pid: u32) -> bool;

    fn conversation_available(&mut self) -> bool;

    fn working_directory(&mut self, _pid: u32) -> Option<PathBuf> {
        None
    }
}

pub struct DdeTransport<C> {
    client: C,
    version_major: i32,
    pid: Option<u32>,
    working_directory: Option<PathBuf>,
    closed: bool,
}

impl<C: DdeClient> DdeTransport<C> {
    pub fn new(mut client: C, version_major: i32) -> Self {
        let pid = client.partner_pid();
        let working_directory = pid.and_then(|pid| client.working_directory(pid));
        DdeTransport {
            client,
            version_major,
            pid,
            working_directory,
            closed: false,
        }
    }
}

impl<C: DdeClient> EngineTransport for DdeTransport<C> {
    fn family(&self) -> EngineFamily {
        EngineFamily::Dde
    }

    fn unit_limit(&self) -> Option<usize> {
        None
    }

    fn send_units(&mut self, units: &[&[u8]]) -> Result<EngineReply, TransportError> {
        if self.closed {
            return Err(TransportError::EngineExited);
        }

        let mut reply = Vec::new();
        for unit in units {
            let (result, binary) = if *unit == BRAIN_DUMP {
                (self.client.brain_activity(), true)
            } else {
                (self.client.execute_macro(unit), false)
            };

            match result {
                Ok(Some(mut bytes)) => {
                    strip_trailing_nuls(&mut bytes);
                    if binary {
                        return Ok(EngineReply::Binary(bytes));
                    }
                    reply.extend_from_slice(&bytes);
                }
                Ok(None) => {
                    self.closed = true;
                    return Err(TransportError::EngineExited);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(EngineReply::Text(reply))
    }

    fn is_closed(&mut self) -> bool {
        if !self.closed {
            self.closed = match self.pid {
                Some(pid) => !self.client.process_running(pid),
                None => !self.client.conversation_available(),
            };
        }
        self.closed
    }

    fn working_directory(&self) -> Option<PathBuf> {
        self.working_directory.clone()
    }

    fn handshake(&mut self) -> Result<EngineInfo, DiscoveryError> {
        let name = if self.version_major > bridge_core::engine_info::FIRST_GENERATION_MAX_MAJOR {
            "Creatures 2"
        } else {
            "Creatures"
        };

        Ok(EngineInfo {
            family: EngineFamily::Dde,
            version_major: self.version_major,
            version_minor: 0,
            name: name.to_string(),
            working_directory: self.working_directory.clone(),
        })
    }
}

fn strip_trailing_nuls(bytes: &mut Vec<u8>) {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
}

/// Leading decimal integer of a `putv` reply.
pub fn parse_major_version(reply: &[u8]) -> Option<i32> {
    let text = String::from_utf8_lossy(reply);
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

/// Asks the `Vivarium` service for its version.
pub struct DdeConnector<C> {
    client: C,
}

impl<C: DdeClient + Clone> DdeConnector<C> {
    pub fn new(client: C) -> Self {
        DdeConnector { client }
    }
}

impl<C: DdeClient + Clone + 'static> EngineConnector for DdeConnector<C> {
    fn name(&self) -> &'static str {
        "dde"
    }

    fn discover(&mut self, _state: &mut DiscoveryState) -> Result<Option<EngineSession>, DiscoveryError> {
        let reply = match self.client.execute_macro(VERSION_MACRO) {
            Ok(Some(reply)) => reply,
            Ok(None) => return Ok(None),
            Err(err) => {
                debug!("no DDE engine: {err}");
                return Ok(None);
            }
        };

        let Some(major) = parse_major_version(&reply) else {
            return Ok(None);
        };

        let transport = DdeTransport::new(self.client.clone(), major);
        EngineSession::attach(Box::new(transport)).map(Some)
    }
}
