mod entity;
mod game_state;
mod settings;
mod types;

pub use entity::{Snake, SnakeView};
pub use game_state::{SnakeGameState, SCORE_PER_FOOD};
pub use settings::{SnakeSettings, MAX_FIELD_SIZE, MIN_FIELD_SIZE};
pub use types::{DeathReason, Direction, FieldSize, Point, TickEvent};
