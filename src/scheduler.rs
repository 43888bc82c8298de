//! Fixed-period control loop.
//!
//! `tick` never blocks: it returns immediately before the deadline and does a
//! bounded amount of work after it. The caller owns the actual waiting, so the
//! same scheduler runs under a sleeping thread or inside a cooperative loop.

use crate::actuator::{ParachuteController, ReleaseMechanism};
use crate::command::{CommandQueue, CommandRequest};
use crate::config::FlightConfig;
use crate::error::{FlightError, SensorFault};
use crate::estimator::{altitude_from_baseline, validate_reading};
use crate::recorder::{FlightLogStore, Recorder};
use crate::sensor::Barometer;
use crate::session::FlightSession;
use crate::telemetry::{Alert, TelemetryHub, TelemetrySnapshot};
use crate::types::{AltitudeSample, CalibrationBaseline, FlightAction, FlightPhase, TerminationReason};
use tracing::{debug, error, info, warn};

/// What one call to [`Scheduler::tick`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// False when the deadline had not been reached yet.
    pub ran: bool,
    pub command: Option<CommandRequest>,
    pub transition: Option<(FlightPhase, FlightPhase)>,
    pub sample: Option<AltitudeSample>,
    pub sensor_fault: Option<SensorFault>,
}

pub struct Scheduler<S, St, M>
where
    S: Barometer,
    St: FlightLogStore,
    M: ReleaseMechanism,
{
    config: FlightConfig,
    sensor: S,
    store: St,
    parachute: ParachuteController<M>,
    commands: CommandQueue,
    telemetry: TelemetryHub,
    session: Option<FlightSession<St::Log>>,
    /// Shown while idle: the previous flight's result.
    last_flight: TelemetrySnapshot,
    next_deadline_ms: Option<u64>,
}

impl<S, St, M> Scheduler<S, St, M>
where
    S: Barometer,
    St: FlightLogStore,
    M: ReleaseMechanism,
{
    pub fn new(
        config: FlightConfig,
        sensor: S,
        store: St,
        mechanism: M,
        commands: CommandQueue,
        telemetry: TelemetryHub,
    ) -> Result<Self, FlightError> {
        config.validate()?;
        let sensor_period = sensor.output_period_ms();
        if sensor_period != config.tick_period_ms {
            return Err(FlightError::Config(format!(
                "tick period {} ms does not match sensor output period {} ms",
                config.tick_period_ms, sensor_period
            )));
        }

        let parachute = ParachuteController::new(mechanism, config.actuation_attempts);
        telemetry.publish(TelemetrySnapshot::default());
        Ok(Self {
            config,
            sensor,
            store,
            parachute,
            commands,
            telemetry,
            session: None,
            last_flight: TelemetrySnapshot::default(),
            next_deadline_ms: None,
        })
    }

    pub fn phase(&self) -> FlightPhase {
        self.session
            .as_ref()
            .map(|s| s.phase())
            .unwrap_or(FlightPhase::Idle)
    }

    pub fn session(&self) -> Option<&FlightSession<St::Log>> {
        self.session.as_ref()
    }

    /// When the next tick is due. Before the first tick this is "now".
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.next_deadline_ms
    }

    pub fn telemetry(&self) -> &TelemetryHub {
        &self.telemetry
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn parachute(&self) -> &ParachuteController<M> {
        &self.parachute
    }

    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let period = self.config.tick_period_ms as u64;
        let deadline = *self.next_deadline_ms.get_or_insert(now_ms);
        if now_ms < deadline {
            return TickOutcome::default();
        }

        let mut next = deadline + period;
        if next <= now_ms {
            warn!(
                "Control loop fell {} ms behind, skipping missed ticks",
                now_ms - deadline
            );
            next = now_ms + period;
        }
        self.next_deadline_ms = Some(next);

        let mut outcome = TickOutcome {
            ran: true,
            ..TickOutcome::default()
        };

        // A command never costs an active flight its sample. Only the tick
        // that creates the session skips sampling; it read the baseline instead.
        if let Some(request) = self.commands.next() {
            outcome.command = Some(request);
            match request {
                CommandRequest::Arm => {
                    if self.arm(&mut outcome) {
                        return outcome;
                    }
                }
                CommandRequest::Disarm => self.disarm(&mut outcome),
            }
        }

        if self.session.is_some() {
            self.sample(period, &mut outcome);
        }
        outcome
    }

    /// Returns true when the tick's sensor read went to capturing a baseline.
    fn arm(&mut self, outcome: &mut TickOutcome) -> bool {
        if self.session.is_some() {
            debug!("Arm ignored, already {}", self.phase());
            return false;
        }

        let reading = match self.sensor.read_pressure_temperature().and_then(validate_reading) {
            Ok(reading) => reading,
            Err(fault) => {
                warn!("Arm refused, cannot capture baseline: {}", fault);
                outcome.sensor_fault = Some(fault);
                return true;
            }
        };
        let baseline = CalibrationBaseline {
            temperature_c: reading.temperature_c,
            pressure_hpa: reading.pressure_hpa,
            absolute_altitude_m: self.sensor.read_absolute_altitude(self.config.sea_level_hpa),
        };
        info!(
            "Baseline captured: {:.2} hPa, {:.2} °C, {:.1} m",
            baseline.pressure_hpa, baseline.temperature_c, baseline.absolute_altitude_m
        );

        match self.parachute.stow() {
            Ok(true) => {}
            Ok(false) => warn!("Parachute release still locked on arm"),
            Err(e) => warn!("Could not stow parachute release on arm: {}", e),
        }

        let mut log_errors = Vec::new();
        let mut recorder = match Recorder::open(&mut self.store) {
            Ok(recorder) => recorder,
            Err(e) => {
                log_errors.push(e);
                Recorder::disabled()
            }
        };
        if let Err(e) = recorder.write_calibration(&baseline) {
            log_errors.push(e);
        }

        self.session = Some(FlightSession::new(baseline, recorder));
        for e in log_errors {
            self.log_fault(e);
        }
        info!("{} -> {}", FlightPhase::Idle, FlightPhase::Armed);
        outcome.transition = Some((FlightPhase::Idle, FlightPhase::Armed));
        self.publish();
        true
    }

    fn disarm(&mut self, outcome: &mut TickOutcome) {
        let Some(session) = self.session.as_mut() else {
            debug!("Disarm ignored, no active flight");
            return;
        };
        let step = session
            .detector_mut()
            .force_terminate(TerminationReason::Disarmed);
        outcome.transition = step.transition();
        self.end_session(TerminationReason::Disarmed);
    }

    fn sample(&mut self, period: u64, outcome: &mut TickOutcome) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.advance_clock(period);

        let baseline = *session.baseline();
        let read = self
            .sensor
            .read_pressure_temperature()
            .and_then(validate_reading)
            .and_then(|r| altitude_from_baseline(r.pressure_hpa, &baseline).map(|alt| (r, alt)));

        let (reading, altitude_m) = match read {
            Ok(ok) => ok,
            Err(fault) => {
                warn!("Discarding sample: {}", fault);
                let degraded_now = session.record_sensor_fault(self.config.degraded_fault_threshold);
                let consecutive_faults = session.consecutive_faults();

                // The detector only sees good samples, so a dead sensor must
                // not keep the session open past the ceiling.
                let ceiling = (session.since_launch_ms() > self.config.max_log_duration_ms).then(|| {
                    session
                        .detector_mut()
                        .force_terminate(TerminationReason::LogDurationCeiling)
                });
                outcome.sensor_fault = Some(fault);

                if degraded_now {
                    warn!("Telemetry degraded after {} consecutive sensor faults", consecutive_faults);
                    self.telemetry
                        .raise(Alert::DegradedTelemetry { consecutive_faults });
                    self.publish();
                }
                if let Some(step) = ceiling {
                    warn!("Logging ceiling reached without a valid sample");
                    outcome.transition = step.transition();
                    self.end_session(TerminationReason::LogDurationCeiling);
                }
                return;
            }
        };

        if session.record_good_sample() {
            info!("Sensor recovered, telemetry no longer degraded");
        }

        let since_launch_ms = session.since_launch_ms();
        let step = session
            .detector_mut()
            .step(altitude_m, since_launch_ms, &self.config);
        if step.is_launch() {
            session.mark_launch(period);
        }

        let sample = AltitudeSample {
            time_ms: session.since_launch_ms(),
            pressure_hpa: reading.pressure_hpa,
            altitude_m,
        };
        outcome.sample = Some(sample);
        outcome.transition = step.transition();

        if step.action == FlightAction::DeployParachute {
            if let Err(e) = self.parachute.fire() {
                error!("{}", e);
                if let Some(session) = self.session.as_mut() {
                    session.record_actuation_failure();
                }
                if let FlightError::Actuation { attempts } = e {
                    self.telemetry.raise(Alert::ActuationFailed { attempts });
                }
            }
        }

        if step.log_sample {
            let abs_altitude_m = self.sensor.read_absolute_altitude(self.config.sea_level_hpa);
            let appended = match self.session.as_mut() {
                Some(session) => session.recorder_mut().append(&sample, abs_altitude_m),
                None => Ok(()),
            };
            if let Err(e) = appended {
                self.log_fault(e);
            }
        }

        match step.action {
            FlightAction::Terminate(reason) => self.end_session(reason),
            _ => {
                self.publish();
            }
        }
    }

    /// Publishes Landed, releases the log and actuator, and drops back to Idle.
    fn end_session(&mut self, reason: TerminationReason) {
        self.publish();
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.recorder_mut().close() {
            warn!("Flight log close failed: {}", e);
            session.record_log_fault();
        }
        self.parachute.unlock();

        info!("Flight session ended ({:?}), {} -> {}", reason, FlightPhase::Landed, FlightPhase::Idle);
        self.last_flight = TelemetrySnapshot {
            phase: FlightPhase::Idle,
            flight_active: false,
            degraded: false,
            ..session.snapshot()
        };
        self.publish();
    }

    fn log_fault(&mut self, e: FlightError) {
        warn!("Flight log fault: {}", e);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.record_log_fault() {
            self.telemetry.raise(Alert::LogFault {
                message: e.to_string(),
            });
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = match self.session.as_ref() {
            Some(session) => session.snapshot(),
            None => self.last_flight.clone(),
        };
        self.telemetry.publish(snapshot);
    }
}
