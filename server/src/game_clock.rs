use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use common::snake::{Direction, SnakeGameState, SnakeSettings, TickEvent};
use common::{GameSnapshot, SessionRng, SnapshotMeta, log};

use crate::broadcaster::Broadcaster;
use crate::control_seat::ControlError;
use crate::mode_controller::ModeController;
use crate::server_config::{clamp_tick_interval_ms, Clamped};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCommand {
    Turn(Direction),
    Start,
    Pause,
    Resume,
    Reset,
    SetTickInterval(Duration),
    SetFieldSize { width: usize, height: usize },
    Shutdown,
}

/// Cloneable sender side of the clock's command queue.
#[derive(Clone)]
pub struct ClockHandle {
    tx: mpsc::UnboundedSender<ClockCommand>,
}

impl ClockHandle {
    pub fn send(&self, command: ClockCommand) -> Result<(), ControlError> {
        self.tx.send(command).map_err(|_| ControlError::ClockStopped)
    }

    pub fn turn(&self, direction: Direction) -> Result<(), ControlError> {
        self.send(ClockCommand::Turn(direction))
    }

    pub fn set_tick_interval_ms(&self, requested: u64) -> Result<Clamped<u64>, ControlError> {
        let clamped = clamp_tick_interval_ms(requested);
        self.send(ClockCommand::SetTickInterval(Duration::from_millis(clamped.applied)))?;
        Ok(clamped)
    }

    pub fn set_field_size(&self, width: usize, height: usize) -> Result<(usize, usize), ControlError> {
        let (width, height) = SnakeSettings::clamp_field_size(width, height);
        self.send(ClockCommand::SetFieldSize { width, height })?;
        Ok((width, height))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ClockCommand::Shutdown);
    }
}

pub struct ClockSettings {
    pub snake: SnakeSettings,
    pub tick_interval: Duration,
    pub buffer_capacity: usize,
}

/// Owns the game state and is the only place it changes. Ticks and queued
/// commands are handled one at a time on the clock task, so the rules
/// engine never sees a half-applied command.
pub struct GameClock {
    state: SnakeGameState,
    settings: SnakeSettings,
    rng: SessionRng,
    round: u64,
    sequence: u64,
    paused: bool,
    pending_direction: Option<Direction>,
    tick_interval: Duration,
    broadcaster: Broadcaster,
    mode: ModeController,
    tx: mpsc::UnboundedSender<ClockCommand>,
    rx: mpsc::UnboundedReceiver<ClockCommand>,
}

impl GameClock {
    /// Builds the first round (paused, sequence 0) and the broadcaster that
    /// holds its snapshot.
    pub fn new(settings: ClockSettings, mut rng: SessionRng, mode: ModeController) -> Self {
        let state = SnakeGameState::new(&settings.snake, &mut rng);
        let tick_interval = Duration::from_millis(
            clamp_tick_interval_ms(settings.tick_interval.as_millis() as u64).applied,
        );
        let initial = Self::snapshot_of(&state, 0, 0, true, &mode, tick_interval);
        let broadcaster = Broadcaster::new(initial, settings.buffer_capacity);
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            state,
            settings: settings.snake,
            rng,
            round: 0,
            sequence: 0,
            paused: true,
            pending_direction: None,
            tick_interval,
            broadcaster,
            mode,
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> ClockHandle {
        ClockHandle { tx: self.tx.clone() }
    }

    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    pub async fn run(mut self) {
        log!(
            "Simulation clock started: {}x{} field, tick every {}ms, seed {}",
            self.state.field_size.width,
            self.state.field_size.height,
            self.tick_interval.as_millis(),
            self.rng.seed()
        );
        let mut timer = new_timer(self.tick_interval);

        loop {
            tokio::select! {
                biased;
                command = self.rx.recv() => {
                    match command {
                        Some(ClockCommand::Shutdown) | None => break,
                        Some(command) => {
                            if self.apply(command) {
                                timer = new_timer(self.tick_interval);
                            }
                        }
                    }
                }
                _ = timer.tick() => {
                    self.tick();
                }
            }
        }

        self.broadcaster.close_all();
        log!("Simulation clock stopped at round {} sequence {}", self.round, self.sequence);
    }

    /// Runs one step of the game if it is running. Returns the published
    /// snapshot, or `None` when paused or over.
    pub fn tick(&mut self) -> Option<Arc<GameSnapshot>> {
        if self.paused || self.state.is_game_over() {
            return None;
        }

        let pending = self.pending_direction.take();
        for event in self.state.advance(pending, &mut self.rng) {
            match event {
                TickEvent::AteFood { at, score } => {
                    log!("Food eaten at ({}, {}), score {}", at.x, at.y, score);
                }
                TickEvent::Died { reason } => {
                    log!(
                        "Game over in round {} after {} ticks: {:?}",
                        self.round,
                        self.sequence + 1,
                        reason
                    );
                }
                _ => {}
            }
        }

        Some(self.publish())
    }

    /// Applies one command. Returns `true` when the tick timer must be
    /// rebuilt.
    pub fn apply(&mut self, command: ClockCommand) -> bool {
        match command {
            ClockCommand::Turn(direction) => {
                // Keep an earlier valid turn rather than let a reversal replace it.
                if !self.state.is_game_over() && !direction.is_opposite(&self.state.snake.direction) {
                    self.pending_direction = Some(direction);
                }
            }
            ClockCommand::Start | ClockCommand::Resume => {
                if self.paused && !self.state.is_game_over() {
                    self.paused = false;
                    self.publish();
                }
            }
            ClockCommand::Pause => {
                if !self.paused && !self.state.is_game_over() {
                    self.paused = true;
                    self.publish();
                }
            }
            ClockCommand::Reset => {
                self.state = self.state.restart(&self.settings, &mut self.rng);
                self.round += 1;
                self.sequence = 0;
                self.paused = false;
                self.pending_direction = None;
                self.publish_current();
                log!("Game reset, round {} started", self.round);
            }
            ClockCommand::SetTickInterval(interval) => {
                self.tick_interval = Duration::from_millis(
                    clamp_tick_interval_ms(interval.as_millis() as u64).applied,
                );
                log!("Tick interval set to {}ms", self.tick_interval.as_millis());
                return true;
            }
            ClockCommand::SetFieldSize { width, height } => {
                let (width, height) = SnakeSettings::clamp_field_size(width, height);
                self.settings.field_width = width;
                self.settings.field_height = height;
                log!("Field size set to {}x{}, applies from the next reset", width, height);
            }
            ClockCommand::Shutdown => {}
        }
        false
    }

    /// Applies every command already queued, without waiting.
    pub fn process_queued_commands(&mut self) {
        while let Ok(command) = self.rx.try_recv() {
            if command == ClockCommand::Shutdown {
                break;
            }
            self.apply(command);
        }
    }

    fn publish(&mut self) -> Arc<GameSnapshot> {
        self.sequence += 1;
        self.publish_current()
    }

    fn publish_current(&mut self) -> Arc<GameSnapshot> {
        let snapshot = Self::snapshot_of(
            &self.state,
            self.round,
            self.sequence,
            self.paused,
            &self.mode,
            self.tick_interval,
        );
        self.broadcaster.publish(snapshot)
    }

    fn snapshot_of(
        state: &SnakeGameState,
        round: u64,
        sequence: u64,
        paused: bool,
        mode: &ModeController,
        tick_interval: Duration,
    ) -> GameSnapshot {
        GameSnapshot::capture(
            state,
            SnapshotMeta {
                round,
                sequence,
                paused,
                mode_version: mode.current().version,
                tick_interval_ms: tick_interval.as_millis() as u64,
            },
        )
    }
}

fn new_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::snake::Point;
    use common::{ClientId, DeliveryMode, logger};
    use crate::control_seat::ControlSeat;

    fn clock_with(snake: SnakeSettings, seed: u64) -> GameClock {
        logger::init_logger(None);
        let mode = ModeController::new(DeliveryMode::Push, ControlSeat::new());
        GameClock::new(
            ClockSettings {
                snake,
                tick_interval: Duration::from_millis(100),
                buffer_capacity: 64,
            },
            SessionRng::new(seed),
            mode,
        )
    }

    fn clock() -> GameClock {
        clock_with(SnakeSettings::default(), 42)
    }

    #[test]
    fn test_starts_paused_at_sequence_zero() {
        let mut clock = clock();
        let latest = clock.broadcaster().latest();
        assert_eq!(latest.sequence, 0);
        assert!(latest.paused);
        assert!(clock.tick().is_none());
    }

    #[test]
    fn test_sequence_increases_by_one_until_game_over() {
        let mut clock = clock();
        let broadcaster = clock.broadcaster();
        let mut channel = broadcaster.register_push();
        clock.apply(ClockCommand::Start);

        while clock.tick().is_some() {}

        let sequences: Vec<u64> = channel.drain().iter().map(|s| s.sequence).collect();
        let expected: Vec<u64> = (0..sequences.len() as u64).collect();
        assert_eq!(sequences, expected);

        let last = broadcaster.latest();
        assert!(last.game_over);
        assert_eq!(last.sequence, *sequences.last().unwrap());
        assert!(clock.tick().is_none());
        assert_eq!(broadcaster.latest().sequence, last.sequence);
    }

    #[test]
    fn test_pause_and_resume_keep_sequence() {
        let mut clock = clock();
        clock.apply(ClockCommand::Start);
        clock.tick();
        clock.apply(ClockCommand::Pause);
        let paused = clock.broadcaster().latest();
        assert!(paused.paused);
        assert!(clock.tick().is_none());

        clock.apply(ClockCommand::Resume);
        let resumed = clock.tick().unwrap();
        assert!(!resumed.paused);
        assert_eq!(resumed.sequence, paused.sequence + 2);
        assert_eq!(resumed.round, 0);
    }

    #[test]
    fn test_pause_keeps_registrations() {
        let mut clock = clock();
        let channel = clock.broadcaster().register_push();
        clock.apply(ClockCommand::Start);
        clock.apply(ClockCommand::Pause);
        assert_eq!(clock.broadcaster().spectator_count(), 1);
        drop(channel);
    }

    #[test]
    fn test_reset_after_game_over_starts_fresh_round() {
        let mut clock = clock();
        clock.apply(ClockCommand::Start);
        while clock.tick().is_some() {}
        assert!(clock.broadcaster().latest().game_over);

        clock.apply(ClockCommand::Start);
        assert!(clock.broadcaster().latest().game_over);

        clock.apply(ClockCommand::Reset);
        let fresh = clock.broadcaster().latest();
        assert_eq!(fresh.sequence, 0);
        assert_eq!(fresh.round, 1);
        assert!(!fresh.game_over);
        assert_eq!(fresh.snake.body.len(), SnakeSettings::default().initial_length);
        assert_eq!(fresh.score, 0);

        let next = clock.tick().unwrap();
        assert_eq!(next.sequence, 1);
        assert_eq!(next.round, 1);
    }

    #[test]
    fn test_reverse_turn_does_not_replace_pending_turn() {
        let mut clock = clock();
        clock.apply(ClockCommand::Start);
        // Heading right: Up is valid, Left is a reversal.
        clock.apply(ClockCommand::Turn(Direction::Up));
        clock.apply(ClockCommand::Turn(Direction::Left));
        let snapshot = clock.tick().unwrap();
        assert_eq!(snapshot.snake.direction, Direction::Up);
        assert_eq!(snapshot.snake.body[0], Point::new(10, 9));
    }

    #[test]
    fn test_pending_direction_survives_pause() {
        let mut clock = clock();
        clock.apply(ClockCommand::Turn(Direction::Down));
        assert!(clock.tick().is_none());
        clock.apply(ClockCommand::Start);
        let snapshot = clock.tick().unwrap();
        assert_eq!(snapshot.snake.direction, Direction::Down);
    }

    #[test]
    fn test_field_size_applies_on_reset() {
        let mut clock = clock();
        clock.apply(ClockCommand::SetFieldSize { width: 12, height: 500 });
        assert_eq!(clock.broadcaster().latest().grid_width, 20);
        clock.apply(ClockCommand::Reset);
        let latest = clock.broadcaster().latest();
        assert_eq!((latest.grid_width, latest.grid_height), (12, 100));
    }

    #[test]
    fn test_initial_length_survives_shrink_and_grow() {
        let settings = SnakeSettings {
            field_width: 40,
            field_height: 40,
            initial_length: 15,
        };
        let mut clock = clock_with(settings, 3);
        clock.apply(ClockCommand::SetFieldSize { width: 10, height: 10 });
        clock.apply(ClockCommand::Reset);
        assert_eq!(clock.broadcaster().latest().snake.body.len(), 6);

        clock.apply(ClockCommand::SetFieldSize { width: 40, height: 40 });
        clock.apply(ClockCommand::Reset);
        let latest = clock.broadcaster().latest();
        assert_eq!((latest.grid_width, latest.grid_height), (40, 40));
        assert_eq!(latest.snake.body.len(), 15);
    }

    #[test]
    fn test_tick_interval_is_clamped() {
        let mut clock = clock();
        assert!(clock.apply(ClockCommand::SetTickInterval(Duration::from_millis(5))));
        assert_eq!(clock.tick_interval, Duration::from_millis(100));
        clock.apply(ClockCommand::SetTickInterval(Duration::from_secs(60)));
        assert_eq!(clock.tick_interval, Duration::from_millis(2000));
    }

    #[test]
    fn test_snapshot_carries_mode_version() {
        logger::init_logger(None);
        let seat = ControlSeat::new();
        seat.claim(ClientId::from("alice")).unwrap();
        let mode = ModeController::new(DeliveryMode::Push, seat);
        let mut clock = GameClock::new(
            ClockSettings {
                snake: SnakeSettings::default(),
                tick_interval: Duration::from_millis(100),
                buffer_capacity: 4,
            },
            SessionRng::new(1),
            mode.clone(),
        );
        mode.toggle(&ClientId::from("alice")).unwrap();
        clock.apply(ClockCommand::Start);
        assert_eq!(clock.tick().unwrap().mode_version, 1);
    }

    #[test]
    fn test_handle_commands_are_applied_in_order() {
        let mut clock = clock();
        let handle = clock.handle();
        handle.send(ClockCommand::Start).unwrap();
        handle.turn(Direction::Down).unwrap();
        handle.send(ClockCommand::Pause).unwrap();
        clock.process_queued_commands();
        let latest = clock.broadcaster().latest();
        assert!(latest.paused);
        assert_eq!(latest.sequence, 2);
        assert_eq!(clock.pending_direction, Some(Direction::Down));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval_and_stops_on_shutdown() {
        let clock = clock();
        let handle = clock.handle();
        let broadcaster = clock.broadcaster();
        let mut channel = broadcaster.register_push();
        let task = tokio::spawn(clock.run());

        handle.send(ClockCommand::Start).unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        let sequences: Vec<u64> = channel.drain().iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

        handle.shutdown();
        task.await.unwrap();
        assert!(channel.recv().await.is_none());
        assert!(handle.send(ClockCommand::Start).is_err());
    }
}
