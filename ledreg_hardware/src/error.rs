use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c bus error: {0}")]
    Bus(String),
    #[error("no device acknowledged at i2c address {address:#04x}")]
    NoDevice { address: u8 },
    #[error("unexpected device at {address:#04x} (manufacturer id {manufacturer_id:#06x})")]
    UnexpectedDevice { address: u8, manufacturer_id: u16 },
    #[error("sensor read before calibration")]
    NotCalibrated,
    #[error("dac code {code} exceeds {max}")]
    CodeOutOfRange { code: u16, max: u16 },
}

pub type Result<T> = std::result::Result<T, HwError>;
