use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::Response,
};
use std::net::SocketAddr;

use crate::AppState;
use crate::bridge;

pub async fn websocket_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let queue_depth = state.config.websocket.client_queue_depth;
    ws.on_upgrade(move |socket| {
        bridge::handle_client(
            socket,
            peer.to_string(),
            state.session.clone(),
            state.registry.clone(),
            state.metrics.clone(),
            queue_depth,
        )
    })
}
