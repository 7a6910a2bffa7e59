pub mod relay;
pub mod score_store;

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use flock_core::net::protocol::MAX_MESSAGE_SIZE;

use relay::SessionRelay;

/// Relay state behind an async RwLock: one writer per inbound frame.
pub type SharedRelay = Arc<RwLock<SessionRelay>>;

/// Build the session router. Split from `serve` so tests can drive a relay
/// in-process on an ephemeral port.
pub fn build_router(relay: SharedRelay) -> Router<()> {
    Router::new()
        .route("/ws", axum::routing::get(session_ws_handler))
        .with_state(relay)
}

/// Serve the session on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, relay: SharedRelay) -> std::io::Result<()> {
    axum::serve(listener, build_router(relay)).await
}

async fn session_ws_handler(
    ws: WebSocketUpgrade,
    State(relay): State<SharedRelay>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session_socket(socket, relay))
}

async fn handle_session_socket(socket: WebSocket, relay: SharedRelay) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let participant = {
        let mut relay = relay.write().await;
        relay.add_connection(tx)
    };

    spawn_writer(ws_sender, rx);

    // Per-connection rate limiter, same pattern as the lobby server.
    let mut rate_limiter = RateLimiter::new(100.0, 100.0);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if data.is_empty() {
            continue;
        }

        if data.len() > MAX_MESSAGE_SIZE {
            tracing::warn!(participant, size = data.len(), "Oversized frame dropped");
            continue;
        }

        if !rate_limiter.allow() {
            tracing::warn!(participant, "Rate limited");
            continue;
        }

        let mut relay = relay.write().await;
        relay.handle_frame(participant, &data);
    }

    let mut relay = relay.write().await;
    relay.remove_connection(participant);
    tracing::info!(participant, "Participant disconnected");
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data.into())).await.is_err() {
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
    refill_rate: f64,
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
