//! Hardware seams for the LED current regulator.
//!
//! The control core only talks to hardware through these traits, so the same
//! loop runs against the INA226/MCP4725 drivers, the simulated bus, or test
//! doubles.
pub mod clock;

use std::time::Duration;
use thiserror::Error;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type carried across trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a bounded wait for the sensor's conversion-ready flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A fresh conversion is available.
    Ready,
    /// Polled once (zero timeout) and no conversion was available.
    NotReady,
    /// The timeout elapsed without a conversion becoming available.
    TimedOut,
}

/// Scaling derived from the shunt and the desired measurable range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorCalibration {
    pub shunt_ohms: f32,
    /// Largest current the sensor can report with this scaling (mA).
    pub max_current_ma: f32,
    /// Current register resolution (mA per count).
    pub current_lsb_ma: f32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("shunt voltage {shunt_voltage_v:.3} V exceeds the measurable 0.080 V")]
    ShuntVoltageTooHigh { shunt_voltage_v: f32 },
    #[error("max current {max_current_a} A is below 1 mA")]
    MaxCurrentTooLow { max_current_a: f32 },
    #[error("shunt {shunt_ohms} ohm is below 1 mOhm")]
    ShuntTooLow { shunt_ohms: f32 },
    #[error("could not normalize current LSB")]
    NormalizationFailed,
    #[error("writing calibration register failed: {0}")]
    Bus(String),
}

/// Current/voltage/power monitor on a two-wire bus.
///
/// Every read queries fresh state from the device; nothing is cached.
pub trait CurrentSensor {
    fn initialize(&mut self, address: u8) -> Result<(), BoxError>;
    fn calibrate(
        &mut self,
        max_current_a: f32,
        shunt_ohms: f32,
    ) -> Result<SensorCalibration, CalibrationError>;
    fn wait_conversion_ready(&mut self, timeout: Duration) -> Result<Readiness, BoxError>;
    /// Bus voltage in volts.
    fn read_bus_voltage(&mut self) -> Result<f32, BoxError>;
    /// Shunt voltage in millivolts.
    fn read_shunt_voltage(&mut self) -> Result<f32, BoxError>;
    /// Load current in milliamps.
    fn read_current(&mut self) -> Result<f32, BoxError>;
    /// Load power in milliwatts.
    fn read_power(&mut self) -> Result<f32, BoxError>;
}

/// Bounded-range digital output driving the gate. No clamping happens here.
pub trait Dac {
    fn set_output(&mut self, value: u16) -> Result<(), BoxError>;
}

/// Auxiliary analog input wired to the DAC output (raw counts).
pub trait SenseInput {
    fn read_raw(&mut self) -> Result<u16, BoxError>;
}

/// Minimal I2C master used by the device drivers.
pub trait I2cBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BoxError>;
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BoxError>;
    fn write_read(&mut self, address: u8, bytes: &[u8], buf: &mut [u8]) -> Result<(), BoxError>;
}

impl<T: CurrentSensor + ?Sized> CurrentSensor for Box<T> {
    fn initialize(&mut self, address: u8) -> Result<(), BoxError> {
        (**self).initialize(address)
    }
    fn calibrate(
        &mut self,
        max_current_a: f32,
        shunt_ohms: f32,
    ) -> Result<SensorCalibration, CalibrationError> {
        (**self).calibrate(max_current_a, shunt_ohms)
    }
    fn wait_conversion_ready(&mut self, timeout: Duration) -> Result<Readiness, BoxError> {
        (**self).wait_conversion_ready(timeout)
    }
    fn read_bus_voltage(&mut self) -> Result<f32, BoxError> {
        (**self).read_bus_voltage()
    }
    fn read_shunt_voltage(&mut self) -> Result<f32, BoxError> {
        (**self).read_shunt_voltage()
    }
    fn read_current(&mut self) -> Result<f32, BoxError> {
        (**self).read_current()
    }
    fn read_power(&mut self) -> Result<f32, BoxError> {
        (**self).read_power()
    }
}

impl<T: Dac + ?Sized> Dac for Box<T> {
    fn set_output(&mut self, value: u16) -> Result<(), BoxError> {
        (**self).set_output(value)
    }
}

impl<T: SenseInput + ?Sized> SenseInput for Box<T> {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        (**self).read_raw()
    }
}
