//! Websocket listener and top-level server wiring.
//!
//! This module:
//! - listens on the configured address/port;
//! - runs the websocket handshake, admitting peers through the registry
//!   (origin check, connection cap, subprotocol negotiation);
//! - spawns one peer task per accepted connection;
//! - spawns the engine poller.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing::{debug, info, warn};

use crate::client;
use crate::config::Config;
use crate::gateway::Gateway;
use crate::local_commands::DefaultLocalCommands;
use crate::poller::Poller;
use crate::registry::{ConnectionRegistry, RegistryError};
use crate::transport::connectors_for_platform;
use crate::types::{OutboundRx, OutboundTx, PeerId};

/// Run the gateway with the given configuration.
pub async fn run(config: Config) -> Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    let registry = ConnectionRegistry::new(config.max_clients);
    let gateway = Gateway::new(registry, Arc::new(DefaultLocalCommands));

    let poller = Poller::new(gateway.clone(), &config, connectors_for_platform(&config));
    tokio::spawn(poller.run());

    serve(listener, gateway, config.trust_forwarded_tls).await
}

/// Accept websocket peers on `listener` forever.
pub async fn serve(listener: TcpListener, gateway: Gateway, trust_forwarded_tls: bool) -> Result<()> {
    loop {
        let (stream, remote) = listener.accept().await.context("accept failed")?;
        let gateway = gateway.clone();

        tokio::spawn(async move {
            accept_peer(gateway, stream, remote, trust_forwarded_tls).await;
        });
    }
}

async fn accept_peer(gateway: Gateway, stream: TcpStream, remote: SocketAddr, trust_forwarded_tls: bool) {
    let (out_tx, out_rx): (OutboundTx, OutboundRx) = mpsc::unbounded_channel();
    let registry = gateway.registry().clone();
    let mut admitted: Option<PeerId> = None;

    let callback = |request: &Request, mut response: Response| {
        let protocols = requested_subprotocols(request);
        let behind_tls = trust_forwarded_tls && forwarded_https(request);

        match registry.on_connect(remote.ip(), behind_tls, protocols.clone(), out_tx) {
            Ok(id) => {
                admitted = Some(id);
                if let Some(value) = protocols.first().and_then(|p| HeaderValue::from_str(p).ok()) {
                    response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                }
                Ok(response)
            }
            Err(err) => Err(reject(&err)),
        }
    };

    let handshake = accept_hdr_async(stream, callback).await;
    match (handshake, admitted) {
        (Ok(ws), Some(id)) => {
            info!(peer = id.0, %remote, "peer connected");
            client::run_peer(gateway, id, ws, out_rx).await;
        }
        (Ok(_), None) => {}
        (Err(err), admitted) => {
            debug!(%remote, "websocket handshake failed: {err}");
            if let Some(id) = admitted {
                registry.release(id);
            }
        }
    }
}

/// Subprotocols offered in `Sec-WebSocket-Protocol`, in offer order.
pub fn requested_subprotocols(request: &Request) -> Vec<String> {
    request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn forwarded_https(request: &Request) -> bool {
    request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

fn reject(err: &RegistryError) -> ErrorResponse {
    let status = match err {
        RegistryError::OriginRejected(_) => StatusCode::FORBIDDEN,
        RegistryError::Full(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    warn!("rejecting peer: {err}");

    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = status;
    response
}
