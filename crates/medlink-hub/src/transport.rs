//! WebSocket transport adapter.
//!
//! Turns one upgraded socket into hub events (`connect`, frames,
//! `disconnect`) and drains the connection's egress queue back onto the
//! socket. The wire encoding is a [`WireCodec`]; `/ws` and `/events` differ
//! only in which codec they hand in.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{
    sink::{Sink, SinkExt},
    stream::StreamExt,
};
use medlink_common::{EventFrameCodec, JsonEnvelopeCodec, MedlinkError, ServerMessage, WireCodec};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::channel::ConnectionId;
use crate::hub::Hub;
use crate::state::AppState;

/// `GET /ws`: JSON-enveloped frames
pub async fn json_envelope_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    upgrade(state, ws, Arc::new(JsonEnvelopeCodec))
}

/// `GET /events`: event-framed arrays
pub async fn event_frame_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    upgrade(state, ws, Arc::new(EventFrameCodec))
}

/// Messages between `max_frame_bytes` and this much beyond it are read and
/// answered with an `error` frame; anything larger is refused by the socket
/// and ends the connection.
const OVERSIZE_HEADROOM_BYTES: usize = 64 * 1024;

fn read_ceiling(max_frame_bytes: usize) -> usize {
    max_frame_bytes.saturating_add(OVERSIZE_HEADROOM_BYTES)
}

fn upgrade(state: AppState, ws: WebSocketUpgrade, codec: Arc<dyn WireCodec>) -> Response {
    let hub = state.hub.clone();
    let max_frame_bytes = state.config.transport.max_frame_bytes;
    let ceiling = read_ceiling(max_frame_bytes);
    ws.max_message_size(ceiling)
        .max_frame_size(ceiling)
        .on_upgrade(move |socket| serve_connection(socket, hub, codec, max_frame_bytes))
}

/// Encode queued messages onto `sink` until the queue closes or a write
/// fails. Returning drops `rx`, so later hub sends see `Closed`.
async fn drain_egress<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<ServerMessage>,
    codec: Arc<dyn WireCodec>,
    conn_id: ConnectionId,
) where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    while let Some(message) = rx.recv().await {
        let text = match message.to_frame().and_then(|frame| codec.encode(&frame)) {
            Ok(text) => text,
            Err(e) => {
                error!(conn_id = %conn_id, kind = message.kind(), error = %e, "Failed to encode frame");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            debug!(conn_id = %conn_id, kind = message.kind(), error = %e, "WebSocket write failed");
            break;
        }
    }
    let _ = sink.close().await;
}

/// Run one connection until the peer goes away
pub async fn serve_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    codec: Arc<dyn WireCodec>,
    max_frame_bytes: usize,
) {
    let (channel, rx) = hub.connect();
    let conn_id = channel.id();
    info!(conn_id = %conn_id, codec = codec.name(), "New hub connection");

    let (ws_sender, mut ws_receiver) = socket.split();

    // Egress: single writer per connection keeps per-peer order
    let writer = tokio::spawn(drain_egress(ws_sender, rx, codec.clone(), conn_id));

    // Ingress
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let text = text.as_str();
                if text.len() > max_frame_bytes {
                    hub.metrics().frame_received();
                    hub.reject(
                        &channel,
                        &MedlinkError::MalformedMessage(format!(
                            "frame of {} bytes exceeds limit of {max_frame_bytes}",
                            text.len()
                        )),
                    );
                    continue;
                }

                match codec.decode(text) {
                    Ok(frame) => hub.on_frame(&channel, frame).await,
                    Err(e) => {
                        hub.metrics().frame_received();
                        hub.reject(&channel, &e);
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                hub.metrics().frame_received();
                hub.reject(
                    &channel,
                    &MedlinkError::MalformedMessage("binary frames are not supported".to_string()),
                );
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    hub.on_disconnect(conn_id).await;
    drop(channel);
    writer.abort();

    info!(conn_id = %conn_id, "Hub connection closed");
}
