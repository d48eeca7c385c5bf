use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::DeliveryMode;
use common::config::Validate;
use common::snake::SnakeSettings;

pub const MIN_TICK_INTERVAL_MS: u64 = 100;
pub const MAX_TICK_INTERVAL_MS: u64 = 2000;
pub const MAX_PULL_DELAY_MS: u64 = 2000;
pub const MIN_OBSERVER_BUFFER_SIZE: usize = 1;
pub const MAX_OBSERVER_BUFFER_SIZE: usize = 256;

pub const CLEANUP_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Result of forcing a runtime setting into its allowed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clamped<T> {
    pub requested: T,
    pub applied: T,
}

impl<T: PartialEq + Copy> Clamped<T> {
    pub fn was_clamped(&self) -> bool {
        self.requested != self.applied
    }
}

pub fn clamp_tick_interval_ms(requested: u64) -> Clamped<u64> {
    Clamped {
        requested,
        applied: requested.clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS),
    }
}

pub fn clamp_pull_delay_ms(requested: u64) -> Clamped<u64> {
    Clamped {
        requested,
        applied: requested.min(MAX_PULL_DELAY_MS),
    }
}

pub fn clamp_observer_buffer_size(requested: usize) -> Clamped<usize> {
    Clamped {
        requested,
        applied: requested.clamp(MIN_OBSERVER_BUFFER_SIZE, MAX_OBSERVER_BUFFER_SIZE),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub static_files_path: Option<String>,
    pub game: SnakeSettings,
    pub tick_interval_ms: u64,
    pub pull_delay_ms: u64,
    pub observer_buffer_size: usize,
    pub rng_seed: Option<u64>,
    pub start_mode: DeliveryMode,
    pub controller_inactivity_timeout_secs: u64,
    pub spectator_idle_timeout_secs: u64,
    pub spectator_send_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            static_files_path: None,
            game: SnakeSettings::default(),
            tick_interval_ms: 500,
            pull_delay_ms: 100,
            observer_buffer_size: 16,
            rng_seed: None,
            start_mode: DeliveryMode::Push,
            controller_inactivity_timeout_secs: 300,
            spectator_idle_timeout_secs: 60,
            spectator_send_timeout_ms: 2000,
        }
    }
}

impl ServerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn controller_inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.controller_inactivity_timeout_secs)
    }

    pub fn spectator_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.spectator_idle_timeout_secs)
    }

    pub fn spectator_send_timeout(&self) -> Duration {
        Duration::from_millis(self.spectator_send_timeout_ms)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid listen address: {}", self.listen_addr));
        }
        self.game.validate()?;
        if clamp_tick_interval_ms(self.tick_interval_ms).was_clamped() {
            return Err(format!(
                "Tick interval must be between {}ms and {}ms",
                MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS
            ));
        }
        if clamp_pull_delay_ms(self.pull_delay_ms).was_clamped() {
            return Err(format!("Pull delay must be at most {}ms", MAX_PULL_DELAY_MS));
        }
        if clamp_observer_buffer_size(self.observer_buffer_size).was_clamped() {
            return Err(format!(
                "Observer buffer size must be between {} and {}",
                MIN_OBSERVER_BUFFER_SIZE, MAX_OBSERVER_BUFFER_SIZE
            ));
        }
        if self.controller_inactivity_timeout_secs == 0 {
            return Err("Controller inactivity timeout must be positive".to_string());
        }
        if self.spectator_idle_timeout_secs == 0 {
            return Err("Spectator idle timeout must be positive".to_string());
        }
        if self.spectator_send_timeout_ms == 0 {
            return Err("Spectator send timeout must be positive".to_string());
        }
        Ok(())
    }
}
