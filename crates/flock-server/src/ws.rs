use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use flock_core::net::messages::ClientMessage;
use flock_core::net::protocol::{MAX_MESSAGE_SIZE, decode_client_message};

use crate::lobby::spawn_session_cycle;
use crate::registry::ConnectionId;
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    let conn_id = {
        let mut lobby = state.lobby.write().await;
        lobby.connect(tx)
    };

    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, conn_id).await;

    // Connection closed — clean up registry and room membership
    let mut lobby = state.lobby.write().await;
    lobby.disconnect(conn_id);
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    conn_id: ConnectionId,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(connection = conn_id, "Rate limited");
            continue;
        }

        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let client_msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(connection = conn_id, error = %e, "Undecodable frame dropped");
                continue;
            },
        };

        match client_msg {
            ClientMessage::Register(m) => {
                let mut lobby = state.lobby.write().await;
                lobby.register(conn_id, &m.username, m.avatar);
            },
            ClientMessage::RequestRooms(_) => {
                let lobby = state.lobby.read().await;
                lobby.request_rooms(conn_id);
            },
            ClientMessage::LobbyChat(m) => {
                let lobby = state.lobby.read().await;
                lobby.chat(conn_id, &m.text);
            },
            ClientMessage::JoinRoom(m) => {
                let mut lobby = state.lobby.write().await;
                lobby.join_room(conn_id, &m.room);
            },
            ClientMessage::Ready(_) => {
                let request = {
                    let mut lobby = state.lobby.write().await;
                    lobby.mark_ready(conn_id)
                };
                // Launch outside the lock: spawning never blocks coordination
                if let Some(request) = request {
                    spawn_session_cycle(Arc::clone(&state.lobby), request);
                }
            },
            ClientMessage::ReturnToLobby(_) => {
                let mut lobby = state.lobby.write().await;
                lobby.return_to_lobby(conn_id);
            },
            // Session-scope traffic belongs on a game session endpoint
            ClientMessage::AnnounceName(_)
            | ClientMessage::PlayerAction(_)
            | ClientMessage::Snapshot(_)
            | ClientMessage::PipeHole(_)
            | ClientMessage::Score(_)
            | ClientMessage::Restart(_)
            | ClientMessage::GetHighScores(_)
            | ClientMessage::SubmitHighScore(_) => {
                tracing::warn!(connection = conn_id, "Session-scope message sent to lobby");
            },
        }
    }
}
