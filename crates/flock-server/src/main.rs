use tracing_subscriber::EnvFilter;

use flock_server::config::ServerConfig;
use flock_server::{build_app, spawn_room_sweeper};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load();
    config.validate();

    let addr = config.listen_addr.clone();
    let (app, state) = build_app(config);
    spawn_room_sweeper(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("flock lobby server listening on {addr}");

    axum::serve(listener, app).await.expect("Server error");
}
