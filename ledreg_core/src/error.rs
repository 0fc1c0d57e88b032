use ledreg_traits::CalibrationError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegulatorError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    /// The sensor polled once and had no fresh conversion.
    #[error("sensor conversion not ready")]
    NotReady,
    #[error("actuator write failed: {0}")]
    Actuator(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

/// Fatal conditions while bringing the sensor up. No retry is attempted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StartupError {
    #[error("current sensor unreachable at i2c address {address:#04x}: {reason}")]
    SensorUnreachable { address: u8, reason: String },
    #[error("sensor calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing current sensor")]
    MissingSensor,
    #[error("missing actuator")]
    MissingActuator,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Rejected operator input. None of these reach controller state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("not a number: {0:?}")]
    NotANumber(String),
    #[error("target must be finite")]
    NonFinite,
    #[error("target {0} mA is negative")]
    Negative(f32),
    #[error("target {value} mA exceeds the {max} mA limit")]
    AboveMaximum { value: f32, max: f32 },
    #[error("line longer than {limit} bytes discarded")]
    LineTooLong { limit: usize },
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
