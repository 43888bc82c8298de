use thiserror::Error;

/// A barometer read that cannot be turned into an altitude.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorFault {
    #[error("Sensor read failed: {0}")]
    ReadFailed(String),

    #[error("Implausible pressure: {pressure_hpa} hPa")]
    ImplausiblePressure { pressure_hpa: f32 },

    #[error("Implausible temperature: {temperature_c} °C")]
    ImplausibleTemperature { temperature_c: f32 },

    #[error("Invalid baseline pressure: {baseline_hpa} hPa")]
    InvalidBaseline { baseline_hpa: f32 },

    #[error("Altitude is not a finite number")]
    NonFiniteAltitude,
}

#[derive(Debug, Error)]
pub enum FlightError {
    #[error(transparent)]
    Sensor(#[from] SensorFault),

    #[error("Flight log I/O error while trying to {context}: {source}")]
    LogIo {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Flight log line {line} is malformed: {reason}")]
    LogFormat { line: usize, reason: String },

    #[error("Parachute release failed after {attempts} attempts")]
    Actuation { attempts: u32 },

    #[error("Malformed command payload: {payload:?}")]
    Protocol { payload: String },

    #[error("Command queue is full")]
    QueueFull,

    #[error("Command queue is closed")]
    QueueClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FlightError {
    pub(crate) fn log_io(context: &'static str, source: std::io::Error) -> Self {
        FlightError::LogIo { context, source }
    }
}
