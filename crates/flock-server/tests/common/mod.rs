use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use flock_core::net::messages::{
    ClientMessage, JoinRoomMsg, ReadyMsg, RegisterMsg, RegisterResponseMsg, ServerMessage,
};
use flock_core::net::protocol::{
    PROTOCOL_VERSION, decode_server_message, encode_client_message,
};
use flock_core::player::Avatar;

use flock_server::build_app;
use flock_server::config::ServerConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with default config on an ephemeral port.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _server: handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a ClientMessage over a WS stream.
pub async fn ws_send(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Read the next ServerMessage from a WS stream (5s timeout).
pub async fn ws_read(stream: &mut WsStream) -> ServerMessage {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return decode_server_message(&data).unwrap();
                },
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Try to read the next ServerMessage, returning None on timeout.
pub async fn ws_try_read(stream: &mut WsStream, timeout_ms: u64) -> Option<ServerMessage> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return decode_server_message(&data).unwrap();
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Read messages until one matches the predicate, skipping interleaved
/// broadcasts (roster refreshes race join notices).
pub async fn ws_read_until<F>(stream: &mut WsStream, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            let msg = ws_read(stream).await;
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("Timed out waiting for matching message")
}

/// Register a display name, returning the server's response.
pub async fn ws_register(stream: &mut WsStream, name: &str) -> RegisterResponseMsg {
    ws_send(
        stream,
        &ClientMessage::Register(RegisterMsg {
            username: name.to_string(),
            avatar: Avatar::default(),
            protocol_version: PROTOCOL_VERSION,
        }),
    )
    .await;
    match ws_read(stream).await {
        ServerMessage::RegisterResponse(r) => r,
        other => panic!("Expected RegisterResponse, got: {other:?}"),
    }
}

/// Register and assert success, draining the roster message that follows.
pub async fn ws_register_ok(stream: &mut WsStream, name: &str) {
    let resp = ws_register(stream, name).await;
    assert!(resp.accepted, "Expected accepted registration: {resp:?}");
    ws_read_until(stream, |m| matches!(m, ServerMessage::LobbyMembers(_))).await;
}

/// Join a room by name.
pub async fn ws_join_room(stream: &mut WsStream, room: &str) {
    ws_send(
        stream,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room: room.to_string(),
        }),
    )
    .await;
}

/// Vote ready.
pub async fn ws_ready(stream: &mut WsStream) {
    ws_send(stream, &ClientMessage::Ready(ReadyMsg {})).await;
}
