use crate::recorder::{FlightLog, Recorder};
use crate::state_machine::PhaseDetector;
use crate::telemetry::TelemetrySnapshot;
use crate::types::{CalibrationBaseline, FlightPhase};

/// State for one arm-to-landing cycle. Owned by the scheduler, which is the
/// only writer; at most one exists at a time.
pub struct FlightSession<L: FlightLog> {
    baseline: CalibrationBaseline,
    detector: PhaseDetector,
    /// Milliseconds since arm, advanced once per sampled tick.
    clock_ms: u64,
    launch_origin_ms: Option<u64>,
    recorder: Recorder<L>,
    consecutive_faults: u32,
    degraded: bool,
    log_faults: u32,
    log_fault_alerted: bool,
    actuation_failed: bool,
}

impl<L: FlightLog> FlightSession<L> {
    pub fn new(baseline: CalibrationBaseline, recorder: Recorder<L>) -> Self {
        Self {
            baseline,
            detector: PhaseDetector::armed(),
            clock_ms: 0,
            launch_origin_ms: None,
            recorder,
            consecutive_faults: 0,
            degraded: false,
            log_faults: 0,
            log_fault_alerted: false,
            actuation_failed: false,
        }
    }

    pub fn baseline(&self) -> &CalibrationBaseline {
        &self.baseline
    }

    pub fn phase(&self) -> FlightPhase {
        self.detector.phase()
    }

    pub fn detector_mut(&mut self) -> &mut PhaseDetector {
        &mut self.detector
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder<L> {
        &mut self.recorder
    }

    pub fn advance_clock(&mut self, period_ms: u64) {
        self.clock_ms += period_ms;
    }

    /// Moves the time origin back one period so the triggering sample is
    /// stamped with a full period rather than zero.
    pub fn mark_launch(&mut self, period_ms: u64) {
        self.launch_origin_ms = Some(self.clock_ms.saturating_sub(period_ms));
    }

    /// Zero until launch.
    pub fn since_launch_ms(&self) -> u64 {
        self.launch_origin_ms
            .map(|origin| self.clock_ms - origin)
            .unwrap_or(0)
    }

    /// Returns true when this fault starts a degraded streak.
    pub fn record_sensor_fault(&mut self, threshold: u32) -> bool {
        self.consecutive_faults += 1;
        if self.degraded || !self.detector.phase().is_airborne() {
            return false;
        }
        if self.consecutive_faults >= threshold {
            self.degraded = true;
            return true;
        }
        false
    }

    /// Returns true when a degraded streak just ended.
    pub fn record_good_sample(&mut self) -> bool {
        self.consecutive_faults = 0;
        std::mem::replace(&mut self.degraded, false)
    }

    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults
    }

    /// Returns true for the first log fault of the session.
    pub fn record_log_fault(&mut self) -> bool {
        self.log_faults += 1;
        !std::mem::replace(&mut self.log_fault_alerted, true)
    }

    pub fn record_actuation_failure(&mut self) {
        self.actuation_failed = true;
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let phase = self.detector.phase();
        TelemetrySnapshot {
            phase,
            flight_active: phase.is_flight_active(),
            apogee_m: self.detector.apogee_m(),
            degraded: self.degraded,
            log_faults: self.log_faults,
            actuation_failed: self.actuation_failed,
        }
    }
}
