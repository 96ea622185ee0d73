//! Binary-frame commands handled by the gateway itself.
//!
//! File save/load/delete/move, QR rendering and path lookups belong to a
//! separate file-command processor plugged in through
//! [`LocalCommandHandler`]. The default handler only knows the two logging
//! commands.

use bridge_core::{EngineInfo, Response};
use bridge_protocol::{BinaryFrame, CommandCode};
use tracing::info;

pub trait LocalCommandHandler: Send + Sync {
    /// Handle a decoded binary frame that is not a directive.
    fn process(&self, frame: &BinaryFrame<'_>, engine: Option<&EngineInfo>) -> Response;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLocalCommands;

impl LocalCommandHandler for DefaultLocalCommands {
    fn process(&self, frame: &BinaryFrame<'_>, _engine: Option<&EngineInfo>) -> Response {
        match frame.command() {
            Some(CommandCode::Log) => {
                info!(target: "gateway", "{}", frame.text);
                Response::empty()
            }
            Some(CommandCode::Debug) => {
                info!(target: "engine_output", "{}", frame.text);
                Response::empty()
            }
            Some(command) => Response::text(format!("ERROR: {command:?} is not supported.")),
            None => Response::text(format!("ERROR: unknown command code {:#010x}.", frame.code)),
        }
    }
}
