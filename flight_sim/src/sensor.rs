use crate::trajectory::get_trajectory_state_at_time;
use apogee_core::{pressure_altitude, pressure_at_altitude, Barometer, PressureReading, SensorFault};
use rand::Rng;
use std::time::Instant;

pub const PAD_PRESSURE_HPA: f32 = 1013.25;
pub const PAD_TEMPERATURE_C: f32 = 20.0;
/// 50 Hz output data rate.
pub const OUTPUT_PERIOD_MS: u32 = 20;

/// Barometer riding the simulated trajectory.
pub struct SimulatedBarometer {
    start_time: Instant,
    fault_probability: f64,
    last_pressure_hpa: f32,
}

impl SimulatedBarometer {
    pub fn new(start_time: Instant, fault_probability: f64) -> Self {
        Self {
            start_time,
            fault_probability: fault_probability.clamp(0.0, 1.0),
            last_pressure_hpa: PAD_PRESSURE_HPA,
        }
    }
}

impl Barometer for SimulatedBarometer {
    fn read_pressure_temperature(&mut self) -> Result<PressureReading, SensorFault> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.fault_probability) {
            return Err(SensorFault::ReadFailed("simulated I2C NACK".into()));
        }

        let state = get_trajectory_state_at_time(self.start_time.elapsed().as_secs_f32());
        let pressure_hpa = pressure_at_altitude(state.altitude, PAD_PRESSURE_HPA, PAD_TEMPERATURE_C)
            + rng.gen_range(-0.01..0.01);
        self.last_pressure_hpa = pressure_hpa;

        Ok(PressureReading {
            pressure_hpa,
            // Temperature decreases with altitude
            temperature_c: PAD_TEMPERATURE_C - state.altitude * 0.0065 + rng.gen_range(-0.05..0.05),
        })
    }

    fn read_absolute_altitude(&mut self, sea_level_hpa: f32) -> f32 {
        pressure_altitude(self.last_pressure_hpa, sea_level_hpa)
    }

    fn output_period_ms(&self) -> u32 {
        OUTPUT_PERIOD_MS
    }
}
