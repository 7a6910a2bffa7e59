use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{RwLock, mpsc};
use tracing_subscriber::EnvFilter;

use flock_core::session::{SpawnConfig, listening_line};
use flock_session::relay::{SessionRelay, StatusEvent};
use flock_session::score_store::FileScoreStore;

#[tokio::main]
async fn main() {
    // stdout is the launcher's status channel; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // The launcher hands over the frozen roster as one JSON line on stdin.
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    if stdin.read_line(&mut line).await.is_err() || line.trim().is_empty() {
        tracing::error!("No spawn config on stdin");
        std::process::exit(1);
    }
    let spawn: SpawnConfig = match serde_json::from_str(line.trim()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Invalid spawn config");
            std::process::exit(1);
        },
    };

    let scores_path =
        std::env::var("FLOCK_SCORES_PATH").unwrap_or_else(|_| "flock-scores.json".to_string());
    let store = Arc::new(FileScoreStore::new(scores_path));

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let relay = Arc::new(RwLock::new(SessionRelay::new(&spawn, store, status_tx)));

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", spawn.port)).await {
        Ok(l) => l,
        Err(e) => {
            // Fatal for this launch attempt; the launcher retries on a fresh port.
            tracing::error!(port = spawn.port, error = %e, "Failed to bind session port");
            std::process::exit(1);
        },
    };

    // The launcher waits for this line before handing the port to clients.
    println!("{}", listening_line(spawn.port));

    tokio::spawn(async move {
        while let Some(event) = status_rx.recv().await {
            match event {
                StatusEvent::RestartRequested => println!("restart requested"),
            }
        }
    });

    tracing::info!(port = spawn.port, boss = %spawn.boss, "Game session serving");
    if let Err(e) = flock_session::serve(listener, relay).await {
        tracing::error!(error = %e, "Session server error");
    }
}
