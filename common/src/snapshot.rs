use serde::Serialize;

use crate::snake::{DeathReason, Point, SnakeGameState, SnakeView};

/// Immutable view of the game produced once per tick (and on pause, resume
/// and reset). Never mutated after construction; shared as `Arc<GameSnapshot>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameSnapshot {
    /// Bumped on every reset.
    pub round: u64,
    /// Starts at 0 for the fresh state of a round, +1 per produced snapshot.
    pub sequence: u64,
    pub snake: SnakeView,
    pub food: Option<Point>,
    pub score: u32,
    pub high_score: u32,
    pub game_over: bool,
    pub death_reason: Option<DeathReason>,
    pub paused: bool,
    pub mode_version: u64,
    pub grid_width: usize,
    pub grid_height: usize,
    pub tick_interval_ms: u64,
}

pub struct SnapshotMeta {
    pub round: u64,
    pub sequence: u64,
    pub paused: bool,
    pub mode_version: u64,
    pub tick_interval_ms: u64,
}

impl GameSnapshot {
    pub fn capture(state: &SnakeGameState, meta: SnapshotMeta) -> Self {
        Self {
            round: meta.round,
            sequence: meta.sequence,
            snake: state.snake.to_view(),
            food: state.food,
            score: state.snake.score,
            high_score: state.high_score,
            game_over: state.is_game_over(),
            death_reason: state.snake.death_reason,
            paused: meta.paused,
            mode_version: meta.mode_version,
            grid_width: state.field_size.width,
            grid_height: state.field_size.height,
            tick_interval_ms: meta.tick_interval_ms,
        }
    }

    /// Delivery order: round first, then sequence within the round.
    pub fn order_key(&self) -> (u64, u64) {
        (self.round, self.sequence)
    }
}
