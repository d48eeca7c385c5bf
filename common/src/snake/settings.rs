use serde::{Deserialize, Serialize};

use crate::config::Validate;

pub const MIN_FIELD_SIZE: usize = 10;
pub const MAX_FIELD_SIZE: usize = 100;
pub const MIN_INITIAL_LENGTH: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnakeSettings {
    pub field_width: usize,
    pub field_height: usize,
    pub initial_length: usize,
}

impl Default for SnakeSettings {
    fn default() -> Self {
        Self {
            field_width: 20,
            field_height: 20,
            initial_length: 3,
        }
    }
}

impl SnakeSettings {
    pub fn clamp_field_size(width: usize, height: usize) -> (usize, usize) {
        (
            width.clamp(MIN_FIELD_SIZE, MAX_FIELD_SIZE),
            height.clamp(MIN_FIELD_SIZE, MAX_FIELD_SIZE),
        )
    }

    /// The snake starts in the middle heading right, so its body has half the
    /// field width to fit in.
    pub fn max_initial_length(&self) -> usize {
        self.field_width / 2 + 1
    }

    /// Length a fresh snake gets on this field. The configured length is
    /// kept as is, so growing the field again restores it.
    pub fn effective_initial_length(&self) -> usize {
        self.initial_length.clamp(MIN_INITIAL_LENGTH, self.max_initial_length())
    }
}

impl Validate for SnakeSettings {
    fn validate(&self) -> Result<(), String> {
        if !(MIN_FIELD_SIZE..=MAX_FIELD_SIZE).contains(&self.field_width) {
            return Err(format!(
                "Field width must be between {} and {}",
                MIN_FIELD_SIZE, MAX_FIELD_SIZE
            ));
        }
        if !(MIN_FIELD_SIZE..=MAX_FIELD_SIZE).contains(&self.field_height) {
            return Err(format!(
                "Field height must be between {} and {}",
                MIN_FIELD_SIZE, MAX_FIELD_SIZE
            ));
        }
        if self.initial_length < MIN_INITIAL_LENGTH || self.initial_length > self.max_initial_length() {
            return Err(format!(
                "Initial snake length must be between {} and {}",
                MIN_INITIAL_LENGTH,
                self.max_initial_length()
            ));
        }
        Ok(())
    }
}
