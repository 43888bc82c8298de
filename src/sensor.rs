use crate::error::SensorFault;
use crate::types::PressureReading;

/// The barometer the control loop samples once per tick.
pub trait Barometer {
    fn read_pressure_temperature(&mut self) -> Result<PressureReading, SensorFault>;

    /// Standard-atmosphere altitude. Debug column only, never a phase input.
    fn read_absolute_altitude(&mut self, sea_level_hpa: f32) -> f32;

    /// How often the part produces a fresh measurement.
    fn output_period_ms(&self) -> u32;
}
