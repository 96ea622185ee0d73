//! Engine discovery and keep-alive loop.
//!
//! While no engine is attached the poller runs discovery every retry
//! interval. Once attached it probes the session every poll interval (retry
//! interval for DDE engines):
//! a probe that finds the engine gone detaches it, otherwise the probe's
//! output is scanned for directives.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bridge_core::DiscoveryState;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine_task::{spawn_session, SessionHandle};
use crate::gateway::Gateway;
use crate::session::EngineSession;
use crate::transport::{discover_any, EngineConnector};

struct Discovery {
    connectors: Vec<Box<dyn EngineConnector>>,
    state: DiscoveryState,
}

pub struct Poller {
    gateway: Gateway,
    probe_command: Option<String>,
    poll_interval: Duration,
    retry_interval: Duration,
    attach_settle: Duration,
    discovery: Arc<Mutex<Discovery>>,
}

impl Poller {
    pub fn new(gateway: Gateway, config: &Config, connectors: Vec<Box<dyn EngineConnector>>) -> Self {
        let probe_command = Some(config.probe_command.trim().to_string()).filter(|c| !c.is_empty());
        Poller {
            gateway,
            probe_command,
            poll_interval: config.poll_interval(),
            retry_interval: config.retry_interval(),
            attach_settle: config.attach_settle(),
            discovery: Arc::new(Mutex::new(Discovery {
                connectors,
                state: DiscoveryState::new(),
            })),
        }
    }

    /// Poll forever.
    pub async fn run(self) {
        loop {
            let delay = self.poll_once().await;
            tokio::time::sleep(delay).await;
        }
    }

    /// One discovery or probe step. Returns how long to wait before the next.
    pub async fn poll_once(&self) -> Duration {
        match self.gateway.session() {
            Some(session) => self.probe(session).await,
            None => self.discover().await,
        }
    }

    async fn discover(&self) -> Duration {
        let discovery = Arc::clone(&self.discovery);
        let found = tokio::task::spawn_blocking(move || {
            let mut guard = discovery.lock().unwrap_or_else(PoisonError::into_inner);
            let Discovery { connectors, state } = &mut *guard;
            discover_any(connectors, state)
        })
        .await;

        match found {
            Ok(Some(session)) => {
                self.attach(session).await;
                self.poll_interval
            }
            Ok(None) => self.retry_interval,
            Err(err) => {
                warn!("discovery task failed: {err}");
                self.retry_interval
            }
        }
    }

    async fn attach(&self, session: EngineSession) {
        let info = session.info();
        info!(
            family = info.family.label(),
            version = %format!("{}.{}", info.version_major, info.version_minor),
            name = %info.name,
            "engine attached"
        );
        if let Some(dir) = &info.working_directory {
            debug!(working_directory = %dir.display(), "engine working directory");
        }

        self.gateway.attach(spawn_session(session));
        tokio::time::sleep(self.attach_settle).await;
    }

    async fn probe(&self, session: SessionHandle) -> Duration {
        // DDE output is never polled; the probe only checks liveness.
        let (command, interval) = if session.info().is_dde() {
            (None, self.retry_interval)
        } else {
            (self.probe_command.clone(), self.poll_interval)
        };

        let outcome = session.probe(command).await;
        if outcome.closed {
            if let Some(handle) = self.gateway.detach() {
                handle.shutdown();
            }
            if outcome.reconnect {
                self.discovery
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .state
                    .arm_reconnect();
            }
            return self.retry_interval;
        }

        match outcome.output {
            Some(output) if output.is_error => warn!("probe failed: {}", output.as_text()),
            Some(output) if !output.is_binary() => self.gateway.route_engine_output(&output.as_text()),
            _ => {}
        }
        interval
    }
}
