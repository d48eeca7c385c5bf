use std::sync::{Arc, Mutex, PoisonError};

use common::{ClientId, DeliveryMode, ModeState, log};

use crate::control_seat::{ControlError, ControlSeat};

/// Process-wide push/pull switch. Anyone may read it; only the seated
/// controller may flip it.
#[derive(Clone)]
pub struct ModeController {
    state: Arc<Mutex<ModeState>>,
    seat: ControlSeat,
}

impl ModeController {
    pub fn new(initial: DeliveryMode, seat: ControlSeat) -> Self {
        Self {
            state: Arc::new(Mutex::new(ModeState::new(initial))),
            seat,
        }
    }

    pub fn current(&self) -> ModeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn toggle(&self, caller: &ClientId) -> Result<ModeState, ControlError> {
        self.seat.authorize(caller)?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = state.toggled();
        log!(
            "Player {} switched delivery mode to {} (version {})",
            caller,
            state.mode,
            state.version
        );
        Ok(*state)
    }
}
