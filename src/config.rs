use crate::error::FlightError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning for one flight computer. Every threshold the phase detector uses lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    /// Sampling period. Must equal the barometer's output data period.
    pub tick_period_ms: u32,
    /// Height above the pad that counts as lift-off.
    pub launch_margin_m: f32,
    /// Drop below the running maximum that counts as apogee.
    pub apogee_margin_m: f32,
    /// Height below which a stable vehicle counts as landed.
    pub touchdown_margin_m: f32,
    /// Largest per-tick altitude change still considered at rest.
    pub stability_epsilon_m: f32,
    /// Logging stops and the session ends this long after launch.
    pub max_log_duration_ms: u64,
    /// Reference for the debug absolute-altitude column only.
    pub sea_level_hpa: f32,
    pub command_queue_capacity: usize,
    /// Consecutive airborne sensor faults before telemetry is flagged degraded.
    pub degraded_fault_threshold: u32,
    /// Release attempts before an actuation fault is raised.
    pub actuation_attempts: u32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 20,
            launch_margin_m: 5.0,
            apogee_margin_m: 2.0,
            touchdown_margin_m: 3.0,
            stability_epsilon_m: 0.2,
            max_log_duration_ms: 180_000,
            sea_level_hpa: 1013.25,
            command_queue_capacity: 8,
            degraded_fault_threshold: 3,
            actuation_attempts: 3,
        }
    }
}

impl FlightConfig {
    pub fn from_json_str(json: &str) -> Result<Self, FlightError> {
        let config: FlightConfig =
            serde_json::from_str(json).map_err(|e| FlightError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FlightError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            FlightError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), FlightError> {
        if self.tick_period_ms == 0 {
            return Err(FlightError::Config("tick_period_ms must be non-zero".into()));
        }

        let margins = [
            ("launch_margin_m", self.launch_margin_m),
            ("apogee_margin_m", self.apogee_margin_m),
            ("touchdown_margin_m", self.touchdown_margin_m),
            ("stability_epsilon_m", self.stability_epsilon_m),
            ("sea_level_hpa", self.sea_level_hpa),
        ];
        for (name, value) in margins {
            if !value.is_finite() || value <= 0.0 {
                return Err(FlightError::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if self.max_log_duration_ms == 0 {
            return Err(FlightError::Config("max_log_duration_ms must be non-zero".into()));
        }
        if self.command_queue_capacity == 0 {
            return Err(FlightError::Config("command_queue_capacity must be non-zero".into()));
        }
        if self.degraded_fault_threshold == 0 {
            return Err(FlightError::Config("degraded_fault_threshold must be non-zero".into()));
        }
        if self.actuation_attempts == 0 {
            return Err(FlightError::Config("actuation_attempts must be non-zero".into()));
        }
        Ok(())
    }
}
