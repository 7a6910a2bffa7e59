pub mod config;
pub mod launcher;
pub mod lobby;
pub mod registry;
pub mod rooms;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::Router;
use tower_http::services::ServeDir;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let web_root = config.web_root.clone();
    let state = AppState::new(config);

    let app = Router::new()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .fallback_service(ServeDir::new(&web_root))
        .with_state(state.clone());

    (app, state)
}

/// Background task that periodically removes idle rooms, returning any
/// stranded members to the lobby.
pub fn spawn_room_sweeper(state: AppState) {
    let interval = Duration::from_secs(state.config.rooms.idle_check_interval_secs);
    let max_idle = Duration::from_secs(state.config.rooms.idle_timeout_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let removed = {
                let mut lobby = state.lobby.write().await;
                lobby.sweep_idle_rooms(max_idle)
            };
            if removed > 0 {
                tracing::info!(removed, "Idle room sweep");
            }
        }
    });
}
