pub mod config;
pub mod id_generator;
pub mod identifiers;
pub mod logger;
pub mod mode;
pub mod session_rng;
pub mod snake;
pub mod snapshot;

pub use identifiers::*;
pub use mode::{DeliveryMode, ModeState};
pub use session_rng::SessionRng;
pub use snapshot::{GameSnapshot, SnapshotMeta};
