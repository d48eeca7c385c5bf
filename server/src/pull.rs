use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use common::{DeliveryMode, GameSnapshot, ModeState};

use crate::broadcaster::Broadcaster;
use crate::mode_controller::ModeController;
use crate::server_config::{clamp_pull_delay_ms, Clamped};
use crate::web_server::WebServerState;

pub const PUSH_PATH: &str = "/ws/spectate";
pub const PULL_PATH: &str = "/api/state";

/// Artificial latency applied to every pull request, shared by all
/// requests and adjustable at runtime.
#[derive(Clone, Debug)]
pub struct PullDelay {
    ms: Arc<AtomicU64>,
}

impl PullDelay {
    pub fn new(ms: u64) -> Self {
        Self {
            ms: Arc::new(AtomicU64::new(clamp_pull_delay_ms(ms).applied)),
        }
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.ms.load(Ordering::Relaxed))
    }

    pub fn set(&self, requested: u64) -> Clamped<u64> {
        let clamped = clamp_pull_delay_ms(requested);
        self.ms.store(clamped.applied, Ordering::Relaxed);
        clamped
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PullResponse {
    pub snapshot: GameSnapshot,
    pub mode: ModeState,
    /// Where a viewer should read from under the current mode.
    pub recommended_path: &'static str,
}

impl PullResponse {
    pub fn read(broadcaster: &Broadcaster, mode: &ModeController) -> Self {
        let mode = mode.current();
        let recommended_path = match mode.mode {
            DeliveryMode::Push => PUSH_PATH,
            DeliveryMode::Pull => PULL_PATH,
        };

        Self {
            snapshot: broadcaster.latest().as_ref().clone(),
            mode,
            recommended_path,
        }
    }
}

/// `GET /api/state`. The delay runs before anything is read, so the mode
/// in the response is the one in force when it is sent.
pub async fn get_state(State(state): State<WebServerState>) -> Json<PullResponse> {
    tokio::time::sleep(state.pull_delay.get()).await;
    Json(PullResponse::read(&state.broadcaster, &state.mode))
}
