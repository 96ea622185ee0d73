//! Message handling between peers, the registry and the attached engine.
//!
//! - text frames go to the engine verbatim and the reply goes back to the
//!   sender: error replies close it with 1002, binary replies become binary
//!   frames;
//! - binary frames are decoded; directive frames are routed through the
//!   registry, everything else goes to the local-command handler;
//! - engine output is split into lines; lines starting with `ws` that parse
//!   as directives are routed, the rest is logged.

use std::sync::{Arc, Mutex, PoisonError};

use bridge_core::{Payload, Response};
use bridge_protocol::{decode_frame, parse_directive};
use tracing::{debug, info, warn};

use crate::engine_task::SessionHandle;
use crate::local_commands::LocalCommandHandler;
use crate::registry::{ConnectionRegistry, RelayRequest};
use crate::relay;
use crate::types::{PeerFrame, PeerId, CLOSE_PROTOCOL_ERROR};

/// Reply to a text frame arriving while no engine is attached.
pub const NO_ENGINE: &str = "no engine attached";

#[derive(Clone)]
pub struct Gateway {
    registry: ConnectionRegistry,
    session: Arc<Mutex<Option<SessionHandle>>>,
    local: Arc<dyn LocalCommandHandler>,
}

impl Gateway {
    pub fn new(registry: ConnectionRegistry, local: Arc<dyn LocalCommandHandler>) -> Self {
        Gateway {
            registry,
            session: Arc::new(Mutex::new(None)),
            local,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Publish a newly attached session to peers.
    pub fn attach(&self, handle: SessionHandle) {
        let info = Arc::clone(handle.info());
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.registry.on_game_attached(info);
    }

    /// Withdraw the session; peers hear `OnGameClosed`.
    pub fn detach(&self) -> Option<SessionHandle> {
        let handle = self.session.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.registry.on_game_detached();
        handle
    }

    /// Forward a text frame to the engine.
    pub async fn handle_text(&self, from: PeerId, text: String) -> Option<PeerFrame> {
        let response = match self.session() {
            Some(session) => session.send(text).await,
            None => Response::error(NO_ENGINE),
        };

        if response.is_error {
            debug!(peer = from.0, "engine error: {}", response.as_text());
        }
        response_to_frame(response)
    }

    /// Decode a binary frame. Malformed frames are answered, not fatal.
    pub fn handle_binary(&self, from: PeerId, data: &[u8]) -> Option<PeerFrame> {
        let frame = match decode_frame(data) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(peer = from.0, "bad binary frame: {err}");
                return Some(PeerFrame::Text(format!("ERROR: {err}")));
            }
        };

        if frame.is_directive() {
            self.route_line(frame.text, Some(from));
            return None;
        }

        let engine = self.registry.engine();
        response_to_frame(self.local.process(&frame, engine.as_deref()))
    }

    /// Scan engine output for directives; log everything else.
    pub fn route_engine_output(&self, output: &str) {
        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if !(line.starts_with("ws") && self.route_line(line, None)) {
                info!(target: "engine_output", "{line}");
            }
        }
    }

    /// Returns false when `line` is not a routable directive.
    fn route_line(&self, line: &str, parent: Option<PeerId>) -> bool {
        let Some(directive) = parse_directive(line).filter(|d| d.is_routable()) else {
            return false;
        };

        for request in self.registry.route_directive(&directive, parent) {
            self.spawn_relay(request);
        }
        true
    }

    fn spawn_relay(&self, request: RelayRequest) {
        let gateway = self.clone();
        tokio::spawn(async move {
            let id = request.id;
            if let Err(err) = relay::run_relay(gateway.clone(), request).await {
                warn!(peer = id.0, "relay failed: {err:#}");
                gateway.registry.release(id);
                gateway.registry.gc();
            }
        });
    }
}

/// Frame to send back for an engine reply. Empty replies send nothing.
pub fn response_to_frame(response: Response) -> Option<PeerFrame> {
    if response.is_empty() && !response.is_error {
        return None;
    }

    match response.payload {
        Payload::Text(reason) if response.is_error => Some(PeerFrame::Close {
            code: CLOSE_PROTOCOL_ERROR,
            reason,
        }),
        Payload::Text(text) => Some(PeerFrame::Text(text)),
        Payload::Binary(bytes) => Some(PeerFrame::Binary(bytes)),
    }
}
