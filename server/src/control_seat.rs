use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use common::{ClientId, log};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    NoActivePlayer,
    NotController,
    SeatTaken,
    MissingClientId,
    ClockStopped,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::NoActivePlayer => write!(f, "No active player"),
            ControlError::NotController => write!(f, "Only the controlling player may do this"),
            ControlError::SeatTaken => write!(f, "Another player is already in control"),
            ControlError::MissingClientId => write!(f, "Missing x-client-id header"),
            ControlError::ClockStopped => write!(f, "Simulation clock is not running"),
        }
    }
}

impl std::error::Error for ControlError {}

struct Occupant {
    client_id: ClientId,
    last_active: Instant,
}

/// The single seat of the controlling participant. At most one client holds
/// it; everybody else is turned away.
#[derive(Clone, Default)]
pub struct ControlSeat {
    occupant: Arc<Mutex<Option<Occupant>>>,
}

impl ControlSeat {
    pub fn new() -> Self {
        Self::default()
    }

    fn occupant(&self) -> MutexGuard<'_, Option<Occupant>> {
        self.occupant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn claim(&self, client_id: ClientId) -> Result<(), ControlError> {
        let mut occupant = self.occupant();
        if occupant.is_some() {
            return Err(ControlError::SeatTaken);
        }
        log!("Player {} took control", client_id);
        *occupant = Some(Occupant {
            client_id,
            last_active: Instant::now(),
        });
        Ok(())
    }

    pub fn release(&self, caller: &ClientId) -> Result<(), ControlError> {
        let mut occupant = self.occupant();
        match occupant.as_ref() {
            None => Err(ControlError::NoActivePlayer),
            Some(current) if &current.client_id != caller => Err(ControlError::NotController),
            Some(_) => {
                log!("Player {} released control", caller);
                *occupant = None;
                Ok(())
            }
        }
    }

    /// Checks that `caller` holds the seat and marks it active.
    pub fn authorize(&self, caller: &ClientId) -> Result<(), ControlError> {
        let mut occupant = self.occupant();
        match occupant.as_mut() {
            None => Err(ControlError::NoActivePlayer),
            Some(current) if &current.client_id != caller => Err(ControlError::NotController),
            Some(current) => {
                current.last_active = Instant::now();
                Ok(())
            }
        }
    }

    pub fn holder(&self) -> Option<ClientId> {
        self.occupant().as_ref().map(|o| o.client_id.clone())
    }

    /// Frees the seat when its holder has been silent for longer than
    /// `timeout`, returning who was removed.
    pub fn release_if_inactive(&self, timeout: Duration) -> Option<ClientId> {
        let mut occupant = self.occupant();
        let inactive = occupant
            .as_ref()
            .is_some_and(|o| o.last_active.elapsed() >= timeout);
        if inactive {
            occupant.take().map(|o| o.client_id)
        } else {
            None
        }
    }
}
