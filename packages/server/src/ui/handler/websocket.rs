//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message as Frame, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::{
    domain::{RoomId, Username},
    hub::{Connection, Session},
    ui::{
        session::{InboundContext, OutboundTiming, pusher_loop, receiver_loop},
        state::AppState,
    },
};

const DEFAULT_USERNAME: &str = "Anonymous";
const DEFAULT_ROOM: &str = "general";

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub username: Option<String>,
    pub room: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = Username::new(or_default(query.username, DEFAULT_USERNAME)).map_err(|e| {
        tracing::warn!("Rejecting connection with invalid username: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let room = RoomId::new(or_default(query.room, DEFAULT_ROOM)).map_err(|e| {
        tracing::warn!("Rejecting connection with invalid room: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let max_message_size = state.connection_config.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, username, room)))
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, username: Username, room: RoomId) {
    let config = state.connection_config;
    let (connection, session) = Connection::open(username, room, config.outbound_capacity);
    let Session {
        info,
        outbound,
        closer,
    } = session;

    if let Err(e) = state.hub.admit(connection).await {
        tracing::warn!("Rejecting '{}' in '{}': {}", info.username, info.room, e);
        let _ = socket.send(Frame::Close(None)).await;
        return;
    }

    let (sink, stream) = socket.split();

    let pusher = tokio::spawn(pusher_loop(
        sink,
        outbound,
        closer.clone(),
        OutboundTiming {
            ping_interval: config.ping_interval,
            write_timeout: config.write_timeout,
        },
    ));

    receiver_loop(
        stream,
        info.clone(),
        closer,
        InboundContext {
            hub: state.hub.clone(),
            store: state.store.clone(),
            clock: state.clock.clone(),
            read_timeout: config.read_timeout,
            persist_timeout: config.persist_timeout,
        },
    )
    .await;

    if let Err(e) = pusher.await {
        tracing::error!("Pusher task for '{}' failed: {}", info.username, e);
    }

    tracing::info!(
        "Connection {} ('{}' in '{}') closed",
        info.id,
        info.username,
        info.room
    );
}
