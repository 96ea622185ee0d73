//! Per-peer websocket I/O.
//!
//! One writer task drains the peer's outbound channel into the socket; the
//! reader loop hands each incoming frame to the gateway and queues the reply
//! on the same channel, so replies and broadcasts share one ordered stream.
//! Inbound clients and outbound relays run the same loop.

use std::borrow::Cow;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use crate::gateway::Gateway;
use crate::types::{OutboundRx, PeerFrame, PeerId};

/// How long a finished reader waits for queued frames to be written.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Run the I/O loops for one peer until either side closes.
pub async fn run_peer<S>(gateway: Gateway, id: PeerId, ws: WebSocketStream<S>, mut out_rx: OutboundRx)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    gateway.registry().mark_open(id);

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let closing = matches!(frame, PeerFrame::Close { .. });
            if let Err(err) = sink.send(to_message(frame)).await {
                debug!(peer = id.0, "write error: {err}");
                break;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        let reply = match msg {
            Ok(Message::Text(text)) => {
                trace!(peer = id.0, len = text.len(), "text frame");
                gateway.handle_text(id, text).await
            }
            Ok(Message::Binary(data)) => gateway.handle_binary(id, &data),
            Ok(Message::Close(frame)) => {
                debug!(peer = id.0, ?frame, "peer closed");
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                debug!(peer = id.0, "read error: {err}");
                break;
            }
        };

        if let Some(frame) = reply {
            gateway.registry().send_to(id, frame);
        }
    }

    // Dropping the registry entry drops the last sender, which ends the writer.
    gateway.registry().release(id);
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    gateway.registry().gc();
    debug!(peer = id.0, "peer finished");
}

fn to_message(frame: PeerFrame) -> Message {
    match frame {
        PeerFrame::Text(text) => Message::Text(text),
        PeerFrame::Binary(bytes) => Message::Binary(bytes),
        PeerFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason),
        })),
    }
}
