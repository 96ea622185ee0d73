// crates/bridge-server/tests/poller.rs
mod common;

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_core::{DiscoveryError, DiscoveryState, EngineFamily, TransportError};
use bridge_server::config::Config;
use bridge_server::gateway::Gateway;
use bridge_server::local_commands::DefaultLocalCommands;
use bridge_server::poller::Poller;
use bridge_server::registry::ConnectionRegistry;
use bridge_server::session::EngineSession;
use bridge_server::transport::EngineConnector;
use bridge_server::types::PeerFrame;
use common::FakeEngine;
use tokio::sync::mpsc;

const POLL: Duration = Duration::from_millis(10);
const RETRY: Duration = Duration::from_millis(20);

/// Hands out queued sessions and records whether a reconnect was armed.
struct QueueConnector {
    sessions: VecDeque<EngineSession>,
    armed: Arc<Mutex<Vec<bool>>>,
}

impl EngineConnector for QueueConnector {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn discover(&mut self, state: &mut DiscoveryState) -> Result<Option<EngineSession>, DiscoveryError> {
        self.armed.lock().unwrap().push(state.is_reconnect_armed());
        Ok(self.sessions.pop_front())
    }
}

fn config() -> Config {
    Config {
        poll_interval_ms: 10,
        retry_interval_ms: 20,
        attach_settle_ms: 0,
        ..Config::default()
    }
}

fn setup(engines: &[&FakeEngine]) -> (Gateway, Poller, Arc<Mutex<Vec<bool>>>) {
    let gateway = Gateway::new(ConnectionRegistry::new(16), Arc::new(DefaultLocalCommands));
    let armed = Arc::new(Mutex::new(Vec::new()));
    let connector = QueueConnector {
        sessions: engines.iter().map(|engine| engine.session()).collect(),
        armed: Arc::clone(&armed),
    };
    let poller = Poller::new(gateway.clone(), &config(), vec![Box::new(connector)]);
    (gateway, poller, armed)
}

#[tokio::test]
async fn discovery_miss_waits_the_retry_interval() {
    let (gateway, poller, _) = setup(&[]);
    assert_eq!(poller.poll_once().await, RETRY);
    assert!(gateway.session().is_none());
}

#[tokio::test]
async fn discovered_engine_is_attached_and_probed() {
    let engine = FakeEngine::new(EngineFamily::Socket);
    let (gateway, poller, _) = setup(&[&engine]);

    assert_eq!(poller.poll_once().await, POLL);
    assert_eq!(gateway.session().unwrap().info().name, "Test Engine");

    assert_eq!(poller.poll_once().await, POLL);
    assert_eq!(engine.received(), vec![b"DBG: POLL".to_vec()]);
}

#[tokio::test]
async fn probe_output_is_routed() {
    let engine = FakeEngine::new(EngineFamily::Socket);
    let (gateway, poller, _) = setup(&[&engine]);
    poller.poll_once().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = gateway
        .registry()
        .on_connect(IpAddr::V4(Ipv4Addr::LOCALHOST), false, vec!["chat".to_string()], tx)
        .unwrap();
    gateway.registry().mark_open(id);
    let _ = rx.try_recv(); // OnGameOpened

    engine.reply_text("log line\nws[chat]:tick\n");
    poller.poll_once().await;
    assert_eq!(rx.try_recv().unwrap(), PeerFrame::Text("tick".into()));
}

#[tokio::test]
async fn dead_engine_is_detached() {
    let engine = FakeEngine::new(EngineFamily::Socket);
    let (gateway, poller, armed) = setup(&[&engine]);
    poller.poll_once().await;

    engine.kill();
    assert_eq!(poller.poll_once().await, RETRY);
    assert!(gateway.session().is_none());
    assert!(gateway.registry().engine().is_none());

    // back to discovery, with no reconnect armed
    poller.poll_once().await;
    assert_eq!(*armed.lock().unwrap(), vec![false, false]);
}

#[tokio::test]
async fn broken_pipe_arms_one_reconnect() {
    let engine = FakeEngine::new(EngineFamily::Socket);
    let (gateway, poller, armed) = setup(&[&engine]);
    poller.poll_once().await;

    engine.reply(Err(TransportError::BrokenPipe));
    assert_eq!(poller.poll_once().await, RETRY);
    assert!(gateway.session().is_none());

    poller.poll_once().await;
    assert_eq!(*armed.lock().unwrap(), vec![false, true]);
}

#[tokio::test]
async fn dde_engines_are_probed_without_a_command() {
    let engine = FakeEngine::new(EngineFamily::Dde);
    let (_gateway, poller, _) = setup(&[&engine]);
    poller.poll_once().await;

    assert_eq!(poller.poll_once().await, RETRY);
    assert!(engine.received().is_empty());
}
