//! Outbound relays opened by routing directives.

use anyhow::{Context, Result};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::info;

use crate::client;
use crate::gateway::Gateway;
use crate::registry::RelayRequest;

/// Connect `request.url` offering `request.protocol`, then run it as a peer.
///
/// On error the caller still owns the registry entry and must release it.
pub async fn run_relay(gateway: Gateway, request: RelayRequest) -> Result<()> {
    let RelayRequest { id, url, protocol, rx } = request;

    let mut http = url
        .as_str()
        .into_client_request()
        .with_context(|| format!("invalid relay URL: {url}"))?;
    let value = HeaderValue::from_str(&protocol)
        .with_context(|| format!("invalid subprotocol: {protocol}"))?;
    http.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);

    let (ws, _response) = connect_async(http)
        .await
        .with_context(|| format!("relay connect to {url} failed"))?;
    info!(peer = id.0, %url, %protocol, "relay connected");

    client::run_peer(gateway, id, ws, rx).await;
    Ok(())
}
