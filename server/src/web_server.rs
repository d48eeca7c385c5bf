use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use common::log;

use crate::broadcaster::Broadcaster;
use crate::control_seat::ControlSeat;
use crate::game_clock::ClockHandle;
use crate::handlers;
use crate::mode_controller::ModeController;
use crate::pull::{self, PullDelay, PULL_PATH, PUSH_PATH};
use crate::ws_handler::ws_upgrade_handler;

#[derive(Clone)]
pub struct WebServerState {
    pub broadcaster: Broadcaster,
    pub clock: ClockHandle,
    pub mode: ModeController,
    pub seat: ControlSeat,
    pub pull_delay: PullDelay,
    pub spectator_idle_timeout: Duration,
    pub spectator_send_timeout: Duration,
}

pub fn build_router(state: WebServerState, static_files_path: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let player = Router::new()
        .route("/connect", post(handlers::connect))
        .route("/disconnect", post(handlers::disconnect))
        .route("/direction/{direction}", post(handlers::change_direction))
        .route("/start", post(handlers::start))
        .route("/pause", post(handlers::pause))
        .route("/resume", post(handlers::resume))
        .route("/reset", post(handlers::reset))
        .route("/speed/{ms}", post(handlers::set_speed))
        .route("/polling-delay/{ms}", post(handlers::set_polling_delay))
        .route("/buffer-size/{size}", post(handlers::set_buffer_size))
        .route("/grid-size/{width}/{height}", post(handlers::set_grid_size))
        .route("/toggle-mode", post(handlers::toggle_mode))
        .route("/spectator-count", get(handlers::spectator_count));

    let mut app = Router::new()
        .nest("/api/player", player)
        .route(PUSH_PATH, get(ws_upgrade_handler))
        .route(PULL_PATH, get(pull::get_state))
        .route("/api/mode", get(handlers::get_mode))
        .route("/api/health", get(handlers::health));

    if let Some(path) = static_files_path {
        app = app.fallback_service(ServeDir::new(path));
    }

    app.layer(cors).with_state(state)
}

pub async fn run_web_server(
    state: WebServerState,
    listen_addr: &str,
    static_files_path: Option<PathBuf>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), String> {
    let app = build_router(state, static_files_path);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| format!("Failed to bind web server address {}: {}", listen_addr, e))?;

    log!("Web server listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Web server error: {}", e))
}
