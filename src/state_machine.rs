use crate::config::FlightConfig;
use crate::types::{FlightAction, FlightPhase, TerminationReason};
use tracing::info;

/// Result of feeding one altitude sample (or a forced stop) to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub from: FlightPhase,
    pub to: FlightPhase,
    pub action: FlightAction,
    /// The sample belongs in the flight log.
    pub log_sample: bool,
}

impl StepOutcome {
    fn stay(phase: FlightPhase, log_sample: bool) -> Self {
        Self {
            from: phase,
            to: phase,
            action: FlightAction::None,
            log_sample,
        }
    }

    pub fn transition(&self) -> Option<(FlightPhase, FlightPhase)> {
        (self.from != self.to).then_some((self.from, self.to))
    }

    /// The launch sample moves the relative clock origin.
    pub fn is_launch(&self) -> bool {
        self.from == FlightPhase::Armed && self.to == FlightPhase::Ascending
    }
}

/// Flight phase detector for a single armed session.
///
/// Transitions are checked as one ordered list per sample, so at most one
/// transition happens per tick: launch, then apogee, then touchdown, then the
/// logging-duration ceiling. Apogee uses a descent-from-peak rule: it only fires
/// once the vehicle has fallen `apogee_margin_m` below the highest sample seen.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDetector {
    phase: FlightPhase,
    running_max_m: f32,
    apogee_m: Option<f32>,
    last_altitude_m: Option<f32>,
}

impl PhaseDetector {
    /// Detector for a freshly armed session.
    pub fn armed() -> Self {
        Self {
            phase: FlightPhase::Armed,
            running_max_m: 0.0,
            apogee_m: None,
            last_altitude_m: None,
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn running_max_m(&self) -> f32 {
        self.running_max_m
    }

    /// Frozen once apogee is detected.
    pub fn apogee_m(&self) -> Option<f32> {
        self.apogee_m
    }

    /// Feeds one valid altitude sample. `since_launch_ms` is the relative clock,
    /// only meaningful once airborne.
    pub fn step(&mut self, altitude_m: f32, since_launch_ms: u64, config: &FlightConfig) -> StepOutcome {
        let from = self.phase;
        let outcome = match self.phase {
            FlightPhase::Armed => {
                if altitude_m >= config.launch_margin_m {
                    self.running_max_m = altitude_m;
                    self.enter(FlightPhase::Ascending, FlightAction::None, true)
                } else {
                    StepOutcome::stay(from, false)
                }
            }
            FlightPhase::Ascending => {
                if altitude_m > self.running_max_m {
                    self.running_max_m = altitude_m;
                }
                if altitude_m <= self.running_max_m - config.apogee_margin_m {
                    self.apogee_m = Some(self.running_max_m);
                    info!("Apogee detected at {:.2} m", self.running_max_m);
                    self.enter(FlightPhase::Descending, FlightAction::DeployParachute, true)
                } else {
                    self.ceiling_check(since_launch_ms, config)
                }
            }
            FlightPhase::Descending => {
                let stable = self
                    .last_altitude_m
                    .map(|last| (altitude_m - last).abs() < config.stability_epsilon_m)
                    .unwrap_or(false);
                // Descending is only entered at apogee, so touchdown needs no
                // separate apogee check.
                if altitude_m < config.touchdown_margin_m && stable {
                    self.enter(
                        FlightPhase::Landed,
                        FlightAction::Terminate(TerminationReason::Touchdown),
                        true,
                    )
                } else {
                    self.ceiling_check(since_launch_ms, config)
                }
            }
            FlightPhase::Idle | FlightPhase::Landed => StepOutcome::stay(from, false),
        };

        if outcome.to != FlightPhase::Landed {
            self.last_altitude_m = Some(altitude_m);
        }
        outcome
    }

    /// Disarm or any other external stop. Always allowed, needs no touchdown.
    pub fn force_terminate(&mut self, reason: TerminationReason) -> StepOutcome {
        if self.phase == FlightPhase::Landed {
            return StepOutcome::stay(FlightPhase::Landed, false);
        }
        self.enter(FlightPhase::Landed, FlightAction::Terminate(reason), false)
    }

    fn ceiling_check(&mut self, since_launch_ms: u64, config: &FlightConfig) -> StepOutcome {
        if since_launch_ms > config.max_log_duration_ms {
            self.enter(
                FlightPhase::Landed,
                FlightAction::Terminate(TerminationReason::LogDurationCeiling),
                false,
            )
        } else {
            StepOutcome::stay(self.phase, true)
        }
    }

    fn enter(&mut self, to: FlightPhase, action: FlightAction, log_sample: bool) -> StepOutcome {
        let from = self.phase;
        self.phase = to;
        info!("{} -> {}", from, to);
        StepOutcome {
            from,
            to,
            action,
            log_sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> FlightConfig {
        FlightConfig {
            launch_margin_m: 1.0,
            apogee_margin_m: 2.0,
            touchdown_margin_m: 3.0,
            stability_epsilon_m: 0.2,
            max_log_duration_ms: 60_000,
            ..FlightConfig::default()
        }
    }

    fn ascending_at(max: f32) -> PhaseDetector {
        let cfg = config();
        let mut detector = PhaseDetector::armed();
        detector.step(max, 20, &cfg);
        assert_eq!(detector.phase(), FlightPhase::Ascending);
        detector
    }

    #[test]
    fn test_launch_at_third_sample() {
        let cfg = config();
        let mut detector = PhaseDetector::armed();

        assert_eq!(detector.step(0.2, 0, &cfg).transition(), None);
        assert_eq!(detector.step(0.5, 0, &cfg).transition(), None);
        let outcome = detector.step(1.3, 20, &cfg);
        assert_eq!(
            outcome.transition(),
            Some((FlightPhase::Armed, FlightPhase::Ascending))
        );
        assert!(outcome.is_launch());
        assert!(outcome.log_sample);
    }

    #[test]
    fn test_armed_samples_are_not_logged() {
        let cfg = config();
        let mut detector = PhaseDetector::armed();
        assert!(!detector.step(0.3, 0, &cfg).log_sample);
    }

    #[test]
    fn test_running_max_follows_ascent() {
        let cfg = config();
        let mut detector = ascending_at(10.0);
        detector.step(25.0, 40, &cfg);
        detector.step(24.0, 60, &cfg);
        assert_eq!(detector.running_max_m(), 25.0);
        assert_eq!(detector.phase(), FlightPhase::Ascending);
    }

    #[test]
    fn test_apogee_descent_from_peak() {
        let cfg = config();
        let mut detector = ascending_at(50.0);

        assert_eq!(detector.step(48.5, 40, &cfg).transition(), None);
        assert_eq!(detector.step(48.1, 60, &cfg).transition(), None);

        let outcome = detector.step(47.9, 80, &cfg);
        assert_eq!(
            outcome.transition(),
            Some((FlightPhase::Ascending, FlightPhase::Descending))
        );
        assert_eq!(outcome.action, FlightAction::DeployParachute);
        assert_eq!(detector.apogee_m(), Some(50.0));
    }

    #[test]
    fn test_apogee_fires_exactly_at_margin() {
        let cfg = config();
        let mut detector = ascending_at(50.0);
        let outcome = detector.step(48.0, 40, &cfg);
        assert_eq!(outcome.action, FlightAction::DeployParachute);
    }

    #[test]
    fn test_deploy_requested_once() {
        let cfg = config();
        let mut detector = ascending_at(50.0);
        let mut deploys = 0;
        for altitude in [47.0, 40.0, 60.0, 30.0, 20.0] {
            if detector.step(altitude, 100, &cfg).action == FlightAction::DeployParachute {
                deploys += 1;
            }
        }
        assert_eq!(deploys, 1);
        assert_eq!(detector.apogee_m(), Some(50.0));
    }

    #[test]
    fn test_touchdown_needs_stability() {
        let cfg = config();
        let mut detector = ascending_at(50.0);
        detector.step(45.0, 40, &cfg);
        assert_eq!(detector.phase(), FlightPhase::Descending);

        // Low but still moving fast.
        assert_eq!(detector.step(2.5, 60, &cfg).transition(), None);
        assert_eq!(detector.step(1.0, 80, &cfg).transition(), None);

        let outcome = detector.step(1.05, 100, &cfg);
        assert_eq!(
            outcome.transition(),
            Some((FlightPhase::Descending, FlightPhase::Landed))
        );
        assert_eq!(
            outcome.action,
            FlightAction::Terminate(TerminationReason::Touchdown)
        );
        assert!(outcome.log_sample);
    }

    #[test]
    fn test_ceiling_ends_session() {
        let cfg = config();
        let mut detector = ascending_at(10.0);
        let outcome = detector.step(30.0, cfg.max_log_duration_ms + 1, &cfg);
        assert_eq!(
            outcome.action,
            FlightAction::Terminate(TerminationReason::LogDurationCeiling)
        );
        assert_eq!(detector.phase(), FlightPhase::Landed);
        assert!(!outcome.log_sample);
    }

    #[test]
    fn test_apogee_preempts_ceiling() {
        let cfg = config();
        let mut detector = ascending_at(50.0);
        let outcome = detector.step(40.0, cfg.max_log_duration_ms + 1, &cfg);
        assert_eq!(outcome.action, FlightAction::DeployParachute);
        assert_eq!(detector.phase(), FlightPhase::Descending);
    }

    #[test]
    fn test_force_terminate_from_any_phase() {
        let mut detector = PhaseDetector::armed();
        let outcome = detector.force_terminate(TerminationReason::Disarmed);
        assert_eq!(
            outcome.transition(),
            Some((FlightPhase::Armed, FlightPhase::Landed))
        );

        let again = detector.force_terminate(TerminationReason::Disarmed);
        assert_eq!(again.transition(), None);

        let mut detector = ascending_at(20.0);
        detector.force_terminate(TerminationReason::Disarmed);
        assert_eq!(detector.phase(), FlightPhase::Landed);
    }

    proptest! {
        #[test]
        fn descending_always_follows_ascending(
            altitudes in proptest::collection::vec(-5.0f32..200.0, 1..200)
        ) {
            let cfg = config();
            let mut detector = PhaseDetector::armed();
            let mut saw_launch_crossing = false;
            for (i, altitude) in altitudes.iter().enumerate() {
                let outcome = detector.step(*altitude, i as u64 * 20, &cfg);
                if *altitude >= cfg.launch_margin_m {
                    saw_launch_crossing = true;
                }
                if outcome.to == FlightPhase::Descending && outcome.from != FlightPhase::Descending {
                    prop_assert_eq!(outcome.from, FlightPhase::Ascending);
                    prop_assert!(saw_launch_crossing);
                }
                prop_assert!(outcome.transition() != Some((FlightPhase::Armed, FlightPhase::Descending)));
            }
        }

        #[test]
        fn touchdown_only_after_apogee(
            altitudes in proptest::collection::vec(-5.0f32..100.0, 1..200)
        ) {
            let cfg = config();
            let mut detector = PhaseDetector::armed();
            for (i, altitude) in altitudes.iter().enumerate() {
                let outcome = detector.step(*altitude, i as u64 * 20, &cfg);
                if outcome.to == FlightPhase::Descending {
                    prop_assert!(detector.apogee_m().is_some());
                }
                if outcome.action == FlightAction::Terminate(TerminationReason::Touchdown) {
                    prop_assert_eq!(outcome.from, FlightPhase::Descending);
                    prop_assert!(detector.apogee_m().is_some());
                }
            }
        }

        #[test]
        fn apogee_equals_highest_ascent_sample(
            altitudes in proptest::collection::vec(0.0f32..300.0, 1..200)
        ) {
            let cfg = config();
            let mut detector = PhaseDetector::armed();
            let mut highest_ascent = f32::MIN;
            for (i, altitude) in altitudes.iter().enumerate() {
                let before = detector.phase();
                detector.step(*altitude, i as u64 * 20, &cfg);
                let launched_now = before == FlightPhase::Armed && detector.phase() == FlightPhase::Ascending;
                if launched_now || before == FlightPhase::Ascending {
                    highest_ascent = highest_ascent.max(*altitude);
                }
            }
            if let Some(apogee) = detector.apogee_m() {
                prop_assert_eq!(apogee, highest_ascent);
            }
        }
    }
}
