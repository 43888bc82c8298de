use crate::error::FlightError;
use crate::types::ReleasePosition;
use tracing::{error, info, warn};

/// Physical parachute release. Pulse widths and pin wiring are the
/// implementor's business; the core only ever asks for the two logical positions.
pub trait ReleaseMechanism {
    fn set_position(&mut self, position: ReleasePosition) -> Result<(), FlightError>;
}

/// Guards the release so it fires at most once between two arms.
pub struct ParachuteController<M: ReleaseMechanism> {
    mechanism: M,
    attempts: u32,
    fired: bool,
    locked: bool,
}

impl<M: ReleaseMechanism> ParachuteController<M> {
    pub fn new(mechanism: M, attempts: u32) -> Self {
        Self {
            mechanism,
            attempts: attempts.max(1),
            fired: false,
            locked: false,
        }
    }

    /// Deploys the parachute. Only the first call per session reaches the
    /// mechanism; later calls return `Ok(false)`. A release that fails every
    /// attempt still counts as the session's one try.
    pub fn fire(&mut self) -> Result<bool, FlightError> {
        if self.fired {
            return Ok(false);
        }
        self.fired = true;
        self.locked = true;

        for attempt in 1..=self.attempts {
            match self.mechanism.set_position(ReleasePosition::Deployed) {
                Ok(()) => {
                    info!("Parachute deployed (attempt {})", attempt);
                    return Ok(true);
                }
                Err(e) => warn!("Release attempt {} of {} failed: {}", attempt, self.attempts, e),
            }
        }

        error!("Parachute release failed after {} attempts", self.attempts);
        Err(FlightError::Actuation {
            attempts: self.attempts,
        })
    }

    /// Re-enables `fire` and moves the release back to stowed. Called on arm.
    /// Refused with `Ok(false)` while a deployment is locked in; the mechanism
    /// is not touched.
    pub fn stow(&mut self) -> Result<bool, FlightError> {
        if self.locked {
            warn!("Release is locked after deployment, not stowing");
            return Ok(false);
        }
        self.fired = false;
        self.mechanism.set_position(ReleasePosition::Stowed)?;
        Ok(true)
    }

    /// Drops the re-arm lock at session teardown. The release stays where it is.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn mechanism(&self) -> &M {
        &self.mechanism
    }
}
