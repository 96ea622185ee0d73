//! One attached engine: a transport plus the identity learned during the
//! handshake.
//!
//! `send` does the text plumbing around the transport: UTF-8 → legacy
//! encoding, whitespace normalization for DDE engines, chunking, and decoding
//! the reply. Transport failures come back as error responses; the session
//! never propagates them.

use bridge_core::{DiscoveryError, EngineInfo, FaultClass, Response, TransportError};
use bridge_protocol::{chunk_message, text_codec};
use tracing::{debug, error, warn};

use crate::transport::{EngineReply, EngineTransport};

pub struct EngineSession {
    transport: Box<dyn EngineTransport>,
    info: EngineInfo,
    closed: bool,
    reconnect: bool,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("info", &self.info)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl EngineSession {
    /// Run the handshake on a freshly connected transport.
    pub fn attach(mut transport: Box<dyn EngineTransport>) -> Result<Self, DiscoveryError> {
        let info = transport.handshake()?;
        Ok(EngineSession {
            transport,
            info,
            closed: false,
            reconnect: false,
        })
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    pub fn is_closed(&mut self) -> bool {
        if !self.closed && self.transport.is_closed() {
            self.closed = true;
        }
        self.closed
    }

    /// The session ended on a failure that warrants one forced reconnect.
    pub fn wants_reconnect(&self) -> bool {
        self.reconnect
    }

    /// Send a UTF-8 script and return the decoded reply.
    pub fn send(&mut self, text: &str) -> Response {
        if self.closed {
            return Response::error(TransportError::NotOpen.to_string());
        }

        let mut bytes = text_codec::from_utf8(text.as_bytes());
        if self.info.is_dde() {
            bytes = text_codec::normalize_whitespace(&bytes, true);
        }

        match self.send_bytes(&bytes) {
            Ok(EngineReply::Binary(bytes)) => Response::binary(bytes),
            Ok(EngineReply::Text(bytes)) => Response::text(decode_reply(bytes)),
            Err(err) => self.fail(err),
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<EngineReply, TransportError> {
        if bytes.is_empty() {
            return Ok(EngineReply::Text(Vec::new()));
        }

        let Some(limit) = self.transport.unit_limit() else {
            return self.transport.send_units(&[bytes]);
        };

        let units = chunk_message(bytes, limit);
        if let Some(unit) = units.iter().find(|unit| unit.len() > limit) {
            return Err(TransportError::TooLong {
                len: unit.len(),
                limit,
            });
        }

        if units.len() > 1 {
            debug!(units = units.len(), "sending chunked script");
        }
        self.transport.send_units(&units)
    }

    fn fail(&mut self, err: TransportError) -> Response {
        match err.class() {
            FaultClass::Fatal { reconnect } => {
                warn!(engine = %self.info.name, "engine connection lost: {err}");
                self.closed = true;
                self.reconnect = reconnect;
            }
            FaultClass::Invariant => {
                error!(engine = %self.info.name, "transport invariant violated, dropping session: {err}");
                self.closed = true;
            }
            FaultClass::Transient | FaultClass::Timeout | FaultClass::Rejected => {
                debug!(engine = %self.info.name, "engine request failed: {err}");
            }
        }

        Response::error(err.to_string())
    }
}

fn decode_reply(bytes: Vec<u8>) -> String {
    if text_codec::is_ascii(&bytes) {
        bytes.into_iter().map(char::from).collect()
    } else {
        text_codec::to_utf8(&bytes)
    }
}
