use std::fmt;

use serde::{Deserialize, Serialize};

/// Which delivery path viewers are steered toward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Push,
    Pull,
}

impl DeliveryMode {
    pub fn toggled(&self) -> DeliveryMode {
        match self {
            DeliveryMode::Push => DeliveryMode::Pull,
            DeliveryMode::Pull => DeliveryMode::Push,
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Push => write!(f, "push"),
            DeliveryMode::Pull => write!(f, "pull"),
        }
    }
}

/// Current mode plus a counter bumped on every toggle, so a polling viewer
/// can tell that the mode changed since its last response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeState {
    pub mode: DeliveryMode,
    pub version: u64,
}

impl ModeState {
    pub fn new(mode: DeliveryMode) -> Self {
        Self { mode, version: 0 }
    }

    pub fn toggled(&self) -> ModeState {
        ModeState {
            mode: self.mode.toggled(),
            version: self.version + 1,
        }
    }
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new(DeliveryMode::Push)
    }
}
