use std::time::Duration;

use common::log;

use crate::control_seat::ControlSeat;
use crate::game_clock::{ClockCommand, ClockHandle};

pub struct CleanupTask {
    seat: ControlSeat,
    clock: ClockHandle,
    check_interval: Duration,
    inactivity_timeout: Duration,
}

impl CleanupTask {
    pub fn new(
        seat: ControlSeat,
        clock: ClockHandle,
        check_interval: Duration,
        inactivity_timeout: Duration,
    ) -> Self {
        Self {
            seat,
            clock,
            check_interval,
            inactivity_timeout,
        }
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.check_interval);

        loop {
            interval.tick().await;
            if !self.cleanup_inactive() {
                break;
            }
        }
    }

    /// Returns `false` once the clock is gone and there is nothing left to
    /// look after.
    fn cleanup_inactive(&self) -> bool {
        let Some(client_id) = self.seat.release_if_inactive(self.inactivity_timeout) else {
            return true;
        };

        log!("Cleaning up inactive player: {}", client_id);

        if let Err(e) = self.clock.send(ClockCommand::Pause) {
            log!("Failed to pause after releasing {}: {}", client_id, e);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::snake::SnakeSettings;
    use common::{ClientId, DeliveryMode, SessionRng, logger};

    use crate::game_clock::{ClockSettings, GameClock};
    use crate::mode_controller::ModeController;

    #[test]
    fn test_inactive_player_is_released_and_game_paused() {
        logger::init_logger(None);
        let seat = ControlSeat::new();
        let mode = ModeController::new(DeliveryMode::Push, seat.clone());
        let mut clock = GameClock::new(
            ClockSettings {
                snake: SnakeSettings::default(),
                tick_interval: Duration::from_millis(500),
                buffer_capacity: 4,
            },
            SessionRng::new(5),
            mode,
        );
        clock.apply(ClockCommand::Start);
        seat.claim(ClientId::from("alice")).unwrap();

        let task = CleanupTask::new(
            seat.clone(),
            clock.handle(),
            Duration::from_secs(1),
            Duration::ZERO,
        );
        assert!(task.cleanup_inactive());
        assert_eq!(seat.holder(), None);

        clock.process_queued_commands();
        assert!(clock.broadcaster().latest().paused);
    }

    #[test]
    fn test_active_player_is_kept() {
        logger::init_logger(None);
        let seat = ControlSeat::new();
        let mode = ModeController::new(DeliveryMode::Push, seat.clone());
        let clock = GameClock::new(
            ClockSettings {
                snake: SnakeSettings::default(),
                tick_interval: Duration::from_millis(500),
                buffer_capacity: 4,
            },
            SessionRng::new(5),
            mode,
        );
        seat.claim(ClientId::from("alice")).unwrap();

        let task = CleanupTask::new(
            seat.clone(),
            clock.handle(),
            Duration::from_secs(1),
            Duration::from_secs(3600),
        );
        assert!(task.cleanup_inactive());
        assert_eq!(seat.holder(), Some(ClientId::from("alice")));
    }
}
