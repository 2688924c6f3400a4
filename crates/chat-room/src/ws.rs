//! WebSocket surface.
//!
//! One route upgrades authenticated connections and bridges the socket
//! to the room: the socket halves are adapted into the transport-
//! neutral [`Frame`] stream and sink the pumps run on, so everything
//! below this module is free of WebSocket types.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::future::ready;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::errors::TransportError;
use crate::participant::Participant;
use crate::room::{inbound_pump, outbound_pump, Client, Frame, PumpConfig, RoomHandle};

#[derive(Clone)]
pub struct AppState {
    pub room: RoomHandle,
    pub auth: Arc<Authenticator>,
    pub pump: PumpConfig,
}

pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token else {
        warn!(target: "chat.ws", "rejecting connection with no token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let participant = match state.auth.admit(&token) {
        Ok(participant) => participant,
        Err(e) => {
            warn!(target: "chat.ws", error = %e, "rejecting connection");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.max_message_size(state.pump.max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, participant, state))
}

async fn handle_socket(socket: WebSocket, participant: Participant, state: AppState) {
    let (client, outbound_rx) = Client::new(participant.clone(), state.pump.outbound_capacity);
    let client_id = client.id();

    if state.room.register(client).await.is_err() {
        warn!(target: "chat.ws", client_id = %client_id, "room is gone, dropping connection");
        return;
    }
    info!(
        target: "chat.ws",
        client_id = %client_id,
        user_id = %participant.id(),
        nickname = %participant.nickname(),
        "connection established"
    );

    let (sink, stream) = socket.split();
    let frames = stream.map(|item| item.map(ws_to_frame).map_err(TransportError::from));
    let sink = sink
        .sink_map_err(TransportError::from)
        .with(|frame| ready(Ok::<Message, TransportError>(frame_to_ws(frame))));

    // The writer owns the sink half; the reader runs on this task and
    // posts the unregister when the connection dies either way.
    let writer = tokio::spawn(outbound_pump(sink, outbound_rx, state.pump));
    inbound_pump(frames, client_id, state.room.clone(), state.pump).await;
    let _ = writer.await;

    info!(target: "chat.ws", client_id = %client_id, "connection closed");
}

fn ws_to_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Message(Bytes::from(text)),
        Message::Binary(data) => Frame::Message(Bytes::from(data)),
        Message::Ping(_) => Frame::Ping,
        Message::Pong(_) => Frame::Pong,
        Message::Close(_) => Frame::Close,
    }
}

fn frame_to_ws(frame: Frame) -> Message {
    match frame {
        // Envelopes are JSON, sent as text frames.
        Frame::Message(raw) => Message::Text(String::from_utf8_lossy(&raw).into_owned()),
        Frame::Ping => Message::Ping(Vec::new()),
        Frame::Pong => Message::Pong(Vec::new()),
        Frame::Close => Message::Close(None),
    }
}
