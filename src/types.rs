use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightPhase {
    Idle,
    Armed,
    Ascending,
    Descending,
    Landed,
}

impl FlightPhase {
    /// True from arm until the session is torn down.
    pub fn is_flight_active(&self) -> bool {
        matches!(
            self,
            FlightPhase::Armed | FlightPhase::Ascending | FlightPhase::Descending
        )
    }

    /// True once launch has been detected and before touchdown.
    pub fn is_airborne(&self) -> bool {
        matches!(self, FlightPhase::Ascending | FlightPhase::Descending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightPhase::Idle => "Idle",
            FlightPhase::Armed => "Armed",
            FlightPhase::Ascending => "Ascending",
            FlightPhase::Descending => "Descending",
            FlightPhase::Landed => "Landed",
        }
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw barometer output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    pub pressure_hpa: f32,
    pub temperature_c: f32,
}

/// Zero reference captured at arm time. Never mutated during a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    pub temperature_c: f32,
    pub pressure_hpa: f32,
    pub absolute_altitude_m: f32,
}

/// One tick's worth of estimator output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeSample {
    /// Milliseconds on the session's relative clock.
    pub time_ms: u64,
    pub pressure_hpa: f32,
    pub altitude_m: f32,
}

/// Logical positions of the parachute release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleasePosition {
    Stowed,
    Deployed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Touchdown,
    Disarmed,
    LogDurationCeiling,
}

/// Side effect requested by the state machine for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightAction {
    None,
    DeployParachute,
    Terminate(TerminationReason),
}
