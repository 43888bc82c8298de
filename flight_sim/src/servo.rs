use apogee_core::{FlightError, ReleaseMechanism, ReleasePosition};
use tracing::info;

/// Pulse widths for the hobby servo holding the nose cone latch.
const STOWED_PULSE_US: u32 = 1000;
const DEPLOYED_PULSE_US: u32 = 2000;

pub struct SimulatedServo {
    jammed: bool,
}

impl SimulatedServo {
    /// A jammed servo rejects every command.
    pub fn new(jammed: bool) -> Self {
        Self { jammed }
    }
}

impl ReleaseMechanism for SimulatedServo {
    fn set_position(&mut self, position: ReleasePosition) -> Result<(), FlightError> {
        if self.jammed {
            return Err(FlightError::Actuation { attempts: 1 });
        }
        let pulse_us = match position {
            ReleasePosition::Stowed => STOWED_PULSE_US,
            ReleasePosition::Deployed => DEPLOYED_PULSE_US,
        };
        info!("Servo -> {:?} ({} us)", position, pulse_us);
        Ok(())
    }
}
