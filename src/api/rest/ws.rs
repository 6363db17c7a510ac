use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    /// Comma-separated topic filter, e.g. `riders,order:SE000042`.
    /// Empty means every topic.
    #[serde(default)]
    pub topics: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let topics: HashSet<String> = params
        .topics
        .split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    ws.on_upgrade(move |socket| handle_socket(socket, state, topics))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, topics: HashSet<String>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events.subscribe();

    info!(topics = ?topics, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Ok(envelope) = rx.recv().await {
            if !topics.is_empty() && !topics.contains(&envelope.topic) {
                continue;
            }

            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event envelope for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
