#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrajectoryPhase {
    PadRest,
    Boost,
    Coast,
    Descent,
    Landed,
}

#[derive(Debug, Clone, Copy)]
pub struct TrajectoryState {
    /// Meters above the pad.
    pub altitude: f32,
    pub vertical_speed: f32,
    pub phase: TrajectoryPhase,
}

const GRAVITY: f32 = 9.81;

// Motor and recovery (SI units)
const BOOST_ACCEL: f32 = 60.0;
const DROGUE_DESCENT_RATE: f32 = 15.0;

// Flight timing (in seconds)
const PAD_REST_DURATION: f32 = 20.0;
const BOOST_DURATION: f32 = 2.0;
const LANDED_DURATION: f32 = 15.0;

fn burnout_speed() -> f32 {
    BOOST_ACCEL * BOOST_DURATION
}

fn burnout_altitude() -> f32 {
    0.5 * BOOST_ACCEL * BOOST_DURATION * BOOST_DURATION
}

fn coast_duration() -> f32 {
    burnout_speed() / GRAVITY
}

/// Highest point of the profile.
pub fn apogee_altitude() -> f32 {
    burnout_altitude() + burnout_speed() * burnout_speed() / (2.0 * GRAVITY)
}

fn descent_duration() -> f32 {
    apogee_altitude() / DROGUE_DESCENT_RATE
}

pub fn total_cycle() -> f32 {
    PAD_REST_DURATION + BOOST_DURATION + coast_duration() + descent_duration() + LANDED_DURATION
}

/// Which repetition of the profile `t` falls in.
pub fn cycle_index(t: f32) -> u64 {
    (t / total_cycle()).floor() as u64
}

pub fn get_trajectory_state_at_time(t: f32) -> TrajectoryState {
    // Loop the flight cycle
    let t = t % total_cycle();

    let mut time_offset = 0.0;

    // PAD REST
    if t < time_offset + PAD_REST_DURATION {
        return at_rest(TrajectoryPhase::PadRest);
    }
    time_offset += PAD_REST_DURATION;

    // BOOST - constant thrust
    if t < time_offset + BOOST_DURATION {
        let phase_time = t - time_offset;
        return TrajectoryState {
            altitude: 0.5 * BOOST_ACCEL * phase_time * phase_time,
            vertical_speed: BOOST_ACCEL * phase_time,
            phase: TrajectoryPhase::Boost,
        };
    }
    time_offset += BOOST_DURATION;

    // COAST - ballistic up to apogee
    if t < time_offset + coast_duration() {
        let phase_time = t - time_offset;
        let v0 = burnout_speed();
        return TrajectoryState {
            altitude: burnout_altitude() + v0 * phase_time - 0.5 * GRAVITY * phase_time * phase_time,
            vertical_speed: v0 - GRAVITY * phase_time,
            phase: TrajectoryPhase::Coast,
        };
    }
    time_offset += coast_duration();

    // DESCENT - under drogue at terminal speed
    if t < time_offset + descent_duration() {
        let phase_time = t - time_offset;
        return TrajectoryState {
            altitude: (apogee_altitude() - DROGUE_DESCENT_RATE * phase_time).max(0.0),
            vertical_speed: -DROGUE_DESCENT_RATE,
            phase: TrajectoryPhase::Descent,
        };
    }

    at_rest(TrajectoryPhase::Landed)
}

fn at_rest(phase: TrajectoryPhase) -> TrajectoryState {
    TrajectoryState {
        altitude: 0.0,
        vertical_speed: 0.0,
        phase,
    }
}
