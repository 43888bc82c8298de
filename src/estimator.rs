//! Barometric altitude math. Pure functions only.

use crate::error::SensorFault;
use crate::types::{CalibrationBaseline, PressureReading};

/// Standard-atmosphere temperature lapse rate (K/m).
const LAPSE_RATE: f32 = 0.0065;
const PRESSURE_EXPONENT: f32 = 0.1903;
const KELVIN_OFFSET: f32 = 273.15;

/// Measurement range of the barometer. Anything outside is a bad read.
pub const PRESSURE_MIN_HPA: f32 = 300.0;
pub const PRESSURE_MAX_HPA: f32 = 1250.0;
pub const TEMPERATURE_MIN_C: f32 = -40.0;
pub const TEMPERATURE_MAX_C: f32 = 85.0;

/// Rejects readings the barometer cannot physically produce.
pub fn validate_reading(reading: PressureReading) -> Result<PressureReading, SensorFault> {
    let p = reading.pressure_hpa;
    if !p.is_finite() || !(PRESSURE_MIN_HPA..=PRESSURE_MAX_HPA).contains(&p) {
        return Err(SensorFault::ImplausiblePressure { pressure_hpa: p });
    }
    let t = reading.temperature_c;
    if !t.is_finite() || !(TEMPERATURE_MIN_C..=TEMPERATURE_MAX_C).contains(&t) {
        return Err(SensorFault::ImplausibleTemperature { temperature_c: t });
    }
    Ok(reading)
}

/// Height above the baseline in meters.
///
/// `altitude = (273.15 + T0) / 0.0065 * (1 - (p / p0) ^ 0.1903)`
///
/// A zero, negative or non-finite pressure is a [`SensorFault`], never a 0.0 altitude.
pub fn relative_altitude(
    pressure_hpa: f32,
    baseline_pressure_hpa: f32,
    baseline_temperature_c: f32,
) -> Result<f32, SensorFault> {
    if !baseline_pressure_hpa.is_finite() || baseline_pressure_hpa <= 0.0 {
        return Err(SensorFault::InvalidBaseline {
            baseline_hpa: baseline_pressure_hpa,
        });
    }
    if !pressure_hpa.is_finite() || pressure_hpa <= 0.0 {
        return Err(SensorFault::ImplausiblePressure { pressure_hpa });
    }
    let kelvin = KELVIN_OFFSET + baseline_temperature_c;
    if !kelvin.is_finite() || kelvin <= 0.0 {
        return Err(SensorFault::ImplausibleTemperature {
            temperature_c: baseline_temperature_c,
        });
    }

    let ratio = pressure_hpa / baseline_pressure_hpa;
    let altitude = kelvin / LAPSE_RATE * (1.0 - ratio.powf(PRESSURE_EXPONENT));
    if altitude.is_finite() {
        Ok(altitude)
    } else {
        Err(SensorFault::NonFiniteAltitude)
    }
}

/// Altitude of `pressure_hpa` relative to a captured baseline.
pub fn altitude_from_baseline(
    pressure_hpa: f32,
    baseline: &CalibrationBaseline,
) -> Result<f32, SensorFault> {
    relative_altitude(pressure_hpa, baseline.pressure_hpa, baseline.temperature_c)
}

/// International-standard-atmosphere altitude above the given sea-level pressure.
/// Only used for the debug column of the flight log.
pub fn pressure_altitude(pressure_hpa: f32, sea_level_hpa: f32) -> f32 {
    44330.0 * (1.0 - (pressure_hpa / sea_level_hpa).powf(PRESSURE_EXPONENT))
}

/// Inverse of [`relative_altitude`]: the pressure observed `altitude_m` above the baseline.
pub fn pressure_at_altitude(
    altitude_m: f32,
    baseline_pressure_hpa: f32,
    baseline_temperature_c: f32,
) -> f32 {
    let kelvin = KELVIN_OFFSET + baseline_temperature_c;
    let fraction = (1.0 - altitude_m * LAPSE_RATE / kelvin).max(0.0);
    baseline_pressure_hpa * fraction.powf(1.0 / PRESSURE_EXPONENT)
}
