// Module declarations
mod actuator;
mod command;
mod config;
mod error;
mod estimator;
mod recorder;
mod scheduler;
mod sensor;
mod session;
mod state_machine;
mod telemetry;
mod types;

// Public API re-exports
pub use actuator::{ParachuteController, ReleaseMechanism};
pub use command::{command_channel, CommandQueue, CommandRequest, CommandSender};
pub use config::FlightConfig;
pub use error::{FlightError, SensorFault};
pub use estimator::{
    altitude_from_baseline, pressure_altitude, pressure_at_altitude, relative_altitude, validate_reading,
};
pub use recorder::{
    calibration_row, replay, sample_row, CsvFlightLog, CsvLogStore, FlightLog, FlightLogStore, MemoryLogStore,
    Recorder, ReplayedFlight, ReplayedRow,
};
pub use scheduler::{Scheduler, TickOutcome};
pub use sensor::Barometer;
pub use session::FlightSession;
pub use state_machine::{PhaseDetector, StepOutcome};
pub use telemetry::{Alert, GatewayPush, TelemetryFeed, TelemetryHub, TelemetrySnapshot};
pub use types::{
    AltitudeSample, CalibrationBaseline, FlightAction, FlightPhase, PressureReading, ReleasePosition,
    TerminationReason,
};
