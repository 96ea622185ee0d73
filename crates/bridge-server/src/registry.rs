//! Registry of tracked websocket peers.
//!
//! The canonical map `PeerId -> PeerConnection` owns every peer's outbound
//! sender. The subprotocol index and the broadcast list only hold ids and are
//! checked against the canonical map on use, so a stale id can never reach a
//! dead connection.
//!
//! A peer is live while its writer task still holds the receiving end of its
//! outbound channel. A relay opened on behalf of another peer is live only
//! while that parent is live.
//!
//! All state sits behind one mutex held for the duration of one operation;
//! sending a frame is a non-blocking channel push, so no I/O happens under it.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bridge_core::{EngineInfo, StatusEvent};
use bridge_protocol::Directive;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::origin;
use crate::types::{next_peer_id, OutboundRx, OutboundTx, PeerFrame, PeerId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection from {0} not allowed: clients must be in a private IP range (client traffic is unencrypted)")]
    OriginRejected(IpAddr),

    #[error("max_clients ({0}) reached")]
    Full(usize),
}

#[derive(Debug)]
pub struct PeerConnection {
    pub id: PeerId,
    tx: OutboundTx,
    /// Peer whose directive caused this relay to be opened.
    pub parent: Option<PeerId>,
    /// Remote URL of an outbound relay.
    pub url: Option<String>,
    pub subprotocols: BTreeSet<String>,
    /// Relay opened by an engine script; dropped when the engine detaches.
    pub is_game_originated: bool,
    /// The websocket handshake completed.
    pub open: bool,
}

impl PeerConnection {
    fn send(&self, frame: PeerFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Outbound relay the caller must start connecting.
#[derive(Debug)]
pub struct RelayRequest {
    pub id: PeerId,
    pub url: String,
    pub protocol: String,
    pub rx: OutboundRx,
}

#[derive(Debug, Default)]
struct RegistryState {
    peers: HashMap<PeerId, PeerConnection>,
    by_protocol: HashMap<String, Vec<PeerId>>,
    broadcast: Vec<PeerId>,
    engine: Option<Arc<EngineInfo>>,
}

impl RegistryState {
    fn is_live(&self, id: PeerId) -> bool {
        let mut current = id;
        // parent chains are short; the bound only guards against a cycle
        for _ in 0..=self.peers.len() {
            let Some(peer) = self.peers.get(&current) else {
                return false;
            };
            if peer.tx.is_closed() {
                return false;
            }
            match peer.parent {
                Some(parent) => current = parent,
                None => return true,
            }
        }
        false
    }

    fn live_peer(&self, id: PeerId) -> Option<&PeerConnection> {
        self.peers.get(&id).filter(|_| self.is_live(id))
    }

    fn insert(&mut self, peer: PeerConnection) {
        for protocol in &peer.subprotocols {
            self.by_protocol.entry(protocol.clone()).or_default().push(peer.id);
        }
        self.peers.insert(peer.id, peer);
    }

    fn broadcast_text(&self, text: &str) -> usize {
        self.broadcast
            .iter()
            .filter_map(|&id| self.live_peer(id))
            .filter(|peer| peer.send(PeerFrame::Text(text.to_string())))
            .count()
    }

    fn collect_dead(&mut self) -> usize {
        let dead: Vec<PeerId> = self
            .peers
            .keys()
            .copied()
            .filter(|&id| !self.is_live(id))
            .collect();

        for id in &dead {
            self.peers.remove(id);
        }
        self.prune_indices();
        dead.len()
    }

    /// Drop dead ids from one protocol index and return the survivors.
    fn live_subscribers(&mut self, protocol: &str) -> Vec<PeerId> {
        let Some(ids) = self.by_protocol.get(protocol) else {
            return Vec::new();
        };
        let live: Vec<PeerId> = ids.iter().copied().filter(|&id| self.is_live(id)).collect();

        if live.is_empty() {
            self.by_protocol.remove(protocol);
        } else if live.len() != ids.len() {
            self.by_protocol.insert(protocol.to_string(), live.clone());
        }
        live
    }

    fn prune_indices(&mut self) {
        let peers = &self.peers;
        self.broadcast.retain(|id| peers.contains_key(id));
        self.by_protocol.retain(|_, ids| {
            ids.retain(|id| peers.contains_key(id));
            !ids.is_empty()
        });
    }
}

/// Shared handle to the registry.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<RegistryState>>,
    max_peers: usize,
}

impl ConnectionRegistry {
    pub fn new(max_peers: usize) -> Self {
        ConnectionRegistry {
            inner: Arc::new(Mutex::new(RegistryState::default())),
            max_peers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit an inbound peer. Public origins are refused unless the request
    /// came through a TLS terminator the configuration trusts.
    pub fn on_connect(
        &self,
        remote: IpAddr,
        behind_trusted_tls: bool,
        subprotocols: impl IntoIterator<Item = String>,
        tx: OutboundTx,
    ) -> Result<PeerId, RegistryError> {
        if !behind_trusted_tls && !origin::is_private(remote) {
            return Err(RegistryError::OriginRejected(remote));
        }

        let mut state = self.lock();
        if state.peers.len() >= self.max_peers {
            return Err(RegistryError::Full(self.max_peers));
        }

        let id = next_peer_id();
        state.insert(PeerConnection {
            id,
            tx,
            parent: None,
            url: None,
            subprotocols: subprotocols.into_iter().filter(|p| !p.is_empty()).collect(),
            is_game_originated: false,
            open: false,
        });

        debug!(peer = id.0, %remote, "peer connected");
        Ok(id)
    }

    /// The handshake of `id` completed: it joins the broadcast list and hears
    /// about an already attached engine.
    pub fn mark_open(&self, id: PeerId) {
        let mut state = self.lock();
        let status = state
            .engine
            .as_ref()
            .map(|engine| engine.status_line(StatusEvent::Opened));

        let Some(peer) = state.peers.get_mut(&id) else {
            return;
        };
        peer.open = true;
        if let Some(status) = status {
            peer.send(PeerFrame::Text(status));
        }

        if !state.broadcast.contains(&id) {
            state.broadcast.push(id);
        }
    }

    /// Forget `id` immediately. Its index entries go on the next `gc`, or when
    /// one of its protocols is next routed.
    pub fn release(&self, id: PeerId) {
        self.lock().peers.remove(&id);
    }

    pub fn on_game_attached(&self, engine: Arc<EngineInfo>) {
        let mut state = self.lock();
        let line = engine.status_line(StatusEvent::Opened);
        state.engine = Some(engine);
        let reached = state.broadcast_text(&line);
        info!(peers = reached, "{line}");
    }

    /// Broadcast the close line and drop every relay opened by the engine.
    pub fn on_game_detached(&self) -> Option<Arc<EngineInfo>> {
        let mut state = self.lock();
        let engine = state.engine.take()?;

        let line = engine.status_line(StatusEvent::Closed);
        let reached = state.broadcast_text(&line);
        info!(peers = reached, "{line}");

        state.peers.retain(|_, peer| !peer.is_game_originated);
        state.collect_dead();
        Some(engine)
    }

    pub fn engine(&self) -> Option<Arc<EngineInfo>> {
        self.lock().engine.clone()
    }

    /// Drop dead peers and every index entry pointing at them. Returns how
    /// many peers were removed.
    pub fn gc(&self) -> usize {
        let removed = self.lock().collect_dead();
        if removed > 0 {
            debug!(removed, "collected dead peers");
        }
        removed
    }

    /// Route one directive. `parent` is the peer that sent it, `None` when it
    /// came from the engine. Returns the relays that must be connected.
    pub fn route_directive(&self, directive: &Directive, parent: Option<PeerId>) -> Vec<RelayRequest> {
        if !directive.is_routable() {
            return Vec::new();
        }

        let mut state = self.lock();
        let protocol = directive.protocol.as_str();
        let url = directive.url();
        let mut relays = Vec::new();

        let subscribers = state.live_subscribers(protocol);

        if let Some(url) = &url {
            let connected = subscribers
                .iter()
                .any(|id| state.peers.get(id).is_some_and(|p| p.url.as_deref() == Some(url)));

            if !connected && state.peers.len() < self.max_peers {
                let (tx, rx) = mpsc::unbounded_channel();
                let id = next_peer_id();
                state.insert(PeerConnection {
                    id,
                    tx,
                    parent,
                    url: Some(url.clone()),
                    subprotocols: BTreeSet::from([protocol.to_string()]),
                    is_game_originated: parent.is_none(),
                    open: false,
                });
                debug!(peer = id.0, %url, protocol, "opening relay");
                relays.push(RelayRequest {
                    id,
                    url: url.clone(),
                    protocol: protocol.to_string(),
                    rx,
                });
            }
        }

        if let Some(message) = &directive.message {
            let targets = relays.iter().map(|relay| relay.id);
            for id in subscribers.iter().copied().chain(targets) {
                let Some(peer) = state.live_peer(id) else {
                    continue;
                };
                if url.is_none() || peer.url == url {
                    peer.send(PeerFrame::Text(message.clone()));
                }
            }
        }

        relays
    }

    /// Queue a frame for one live peer.
    pub fn send_to(&self, id: PeerId, frame: PeerFrame) -> bool {
        self.lock().live_peer(id).is_some_and(|peer| peer.send(frame))
    }

    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.lock().peers.contains_key(&id)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.lock().peers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn subscribers(&self, protocol: &str) -> Vec<PeerId> {
        self.lock().by_protocol.get(protocol).cloned().unwrap_or_default()
    }

    pub fn broadcast_ids(&self) -> Vec<PeerId> {
        self.lock().broadcast.clone()
    }

    /// `(parent, url, is_game_originated)` of a tracked peer.
    pub fn describe(&self, id: PeerId) -> Option<(Option<PeerId>, Option<String>, bool)> {
        self.lock()
            .peers
            .get(&id)
            .map(|peer| (peer.parent, peer.url.clone(), peer.is_game_originated))
    }
}
