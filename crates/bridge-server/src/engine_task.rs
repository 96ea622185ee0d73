//! Session actor.
//!
//! Each attached `EngineSession` is owned by one blocking worker. Client
//! sends, keep-alive probes and shutdown all go through its mailbox and are
//! processed one at a time in arrival order, so transport I/O is never
//! interleaved.

use std::sync::Arc;

use bridge_core::{EngineInfo, Response, TransportError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::session::EngineSession;
use crate::types::{ProbeOutcome, SessionCommand, SessionRx, SessionTx};

/// Cheap, cloneable handle to a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: SessionTx,
    info: Arc<EngineInfo>,
}

impl SessionHandle {
    pub fn info(&self) -> &Arc<EngineInfo> {
        &self.info
    }

    /// Send a script. A dead actor yields an error response, never a hang.
    pub async fn send(&self, text: String) -> Response {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Send { text, reply }).is_err() {
            return closed_response();
        }
        rx.await.unwrap_or_else(|_| closed_response())
    }

    /// Health check, optionally sending `command` and returning its output.
    pub async fn probe(&self, command: Option<String>) -> ProbeOutcome {
        let (reply, rx) = oneshot::channel();
        let dead = ProbeOutcome {
            closed: true,
            reconnect: false,
            output: None,
        };

        if self.tx.send(SessionCommand::Probe { command, reply }).is_err() {
            return dead;
        }
        rx.await.unwrap_or(dead)
    }

    /// Ask the actor to stop after the commands already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

fn closed_response() -> Response {
    Response::error(TransportError::EngineExited.to_string())
}

/// Start the actor for `session` on the blocking pool.
pub fn spawn_session(session: EngineSession) -> SessionHandle {
    let info = Arc::new(session.info().clone());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || run_session_loop(session, rx));

    SessionHandle { tx, info }
}

/// Process commands until shutdown or until every handle is dropped.
pub fn run_session_loop(mut session: EngineSession, mut rx: SessionRx) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            SessionCommand::Send { text, reply } => {
                let response = session.send(&text);
                let _ = reply.send(response);
            }
            SessionCommand::Probe { command, reply } => {
                let _ = reply.send(probe(&mut session, command));
            }
            SessionCommand::Shutdown => break,
        }
    }

    debug!(engine = %session.info().name, "session actor stopped");
}

fn probe(session: &mut EngineSession, command: Option<String>) -> ProbeOutcome {
    let output = match command {
        Some(command) if !command.is_empty() && !session.is_closed() => Some(session.send(&command)),
        _ => None,
    };

    ProbeOutcome {
        closed: session.is_closed(),
        reconnect: session.wants_reconnect(),
        output,
    }
}
