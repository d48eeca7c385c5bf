use serde::Serialize;

use common::{GameSnapshot, ModeState, ObserverId};

/// Frames sent to push spectators over the WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpectatorMessage<'a> {
    Hello {
        observer_id: ObserverId,
        mode: ModeState,
    },
    Snapshot {
        data: &'a GameSnapshot,
        timestamp_ms: i64,
    },
}

impl<'a> SpectatorMessage<'a> {
    pub fn snapshot(data: &'a GameSnapshot) -> Self {
        SpectatorMessage::Snapshot {
            data,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to serialize spectator message: {}", e))
    }
}
