//! INA226 current/voltage/power monitor.
//!
//! Register access is big-endian 16-bit: write the pointer byte, then read
//! two bytes back. Scaling follows the datasheet: 2.5 uV per shunt count,
//! 1.25 mV per bus count, power LSB = 25 x current LSB.

use std::time::Duration;

use ledreg_traits::{
    BoxError, CalibrationError, CurrentSensor, I2cBus, Readiness, SensorCalibration,
};
use tracing::{debug, trace};

use crate::calibration::Ina226Calibration;
use crate::error::{HwError, Result};
use crate::util::poll_until_ready;

pub const DEFAULT_ADDRESS: u8 = 0x40;
pub const MANUFACTURER_ID_TI: u16 = 0x5449;

pub mod reg {
    pub const CONFIGURATION: u8 = 0x00;
    pub const SHUNT_VOLTAGE: u8 = 0x01;
    pub const BUS_VOLTAGE: u8 = 0x02;
    pub const POWER: u8 = 0x03;
    pub const CURRENT: u8 = 0x04;
    pub const CALIBRATION: u8 = 0x05;
    pub const MASK_ENABLE: u8 = 0x06;
    pub const ALERT_LIMIT: u8 = 0x07;
    pub const MANUFACTURER_ID: u8 = 0xFE;
    pub const DIE_ID: u8 = 0xFF;
}

/// Conversion-ready flag in the mask/enable register.
pub const CVRF: u16 = 0x0008;
pub const CONFIG_RESET: u16 = 0x8000;
/// Bits 14..12 read back as 0b100.
const CONFIG_FIXED: u16 = 0x4000;
/// Shunt and bus, continuous.
const MODE_SHUNT_BUS_CONTINUOUS: u16 = 0b111;

pub const SHUNT_LSB_V: f64 = 2.5e-6;
pub const BUS_LSB_V: f64 = 1.25e-3;
pub const POWER_LSB_FACTOR: f64 = 25.0;

/// Number of samples averaged per conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Averaging {
    X1,
    X4,
    #[default]
    X16,
    X64,
    X128,
    X256,
    X512,
    X1024,
}

impl Averaging {
    fn bits(self) -> u16 {
        self as u16
    }

    pub fn from_count(n: u16) -> Option<Self> {
        Some(match n {
            1 => Self::X1,
            4 => Self::X4,
            16 => Self::X16,
            64 => Self::X64,
            128 => Self::X128,
            256 => Self::X256,
            512 => Self::X512,
            1024 => Self::X1024,
            _ => return None,
        })
    }
}

/// Per-channel conversion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionTime {
    Us140,
    Us204,
    Us332,
    Us588,
    #[default]
    Us1100,
    Us2116,
    Us4156,
    Us8244,
}

impl ConversionTime {
    fn bits(self) -> u16 {
        self as u16
    }

    pub fn from_micros(us: u32) -> Option<Self> {
        Some(match us {
            140 => Self::Us140,
            204 => Self::Us204,
            332 => Self::Us332,
            588 => Self::Us588,
            1100 => Self::Us1100,
            2116 => Self::Us2116,
            4156 => Self::Us4156,
            8244 => Self::Us8244,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ina226Config {
    pub averaging: Averaging,
    pub bus_conversion: ConversionTime,
    pub shunt_conversion: ConversionTime,
    /// Sleep between conversion-ready polls.
    pub poll_interval: Duration,
    /// Round the current LSB to a 1/2/5 step during calibration.
    pub normalize_lsb: bool,
}

impl Default for Ina226Config {
    fn default() -> Self {
        Self {
            averaging: Averaging::default(),
            bus_conversion: ConversionTime::default(),
            shunt_conversion: ConversionTime::default(),
            poll_interval: Duration::from_millis(1),
            normalize_lsb: true,
        }
    }
}

impl Ina226Config {
    /// Configuration register word for continuous shunt+bus conversions.
    pub fn register_value(&self) -> u16 {
        CONFIG_FIXED
            | (self.averaging.bits() << 9)
            | (self.bus_conversion.bits() << 6)
            | (self.shunt_conversion.bits() << 3)
            | MODE_SHUNT_BUS_CONTINUOUS
    }
}

pub struct Ina226<B> {
    bus: B,
    address: u8,
    config: Ina226Config,
    calibration: Option<Ina226Calibration>,
}

impl<B: I2cBus> Ina226<B> {
    pub fn new(bus: B, config: Ina226Config) -> Self {
        Self {
            bus,
            address: DEFAULT_ADDRESS,
            config,
            calibration: None,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn calibration(&self) -> Option<&Ina226Calibration> {
        self.calibration.as_ref()
    }

    pub fn read_register(&mut self, register: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.bus
            .write_read(self.address, &[register], &mut buf)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        let value = u16::from_be_bytes(buf);
        trace!(register, value, "ina226 read");
        Ok(value)
    }

    pub fn write_register(&mut self, register: u8, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        trace!(register, value, "ina226 write");
        self.bus
            .write(self.address, &[register, hi, lo])
            .map_err(|e| HwError::Bus(e.to_string()))
    }

    pub fn manufacturer_id(&mut self) -> Result<u16> {
        self.read_register(reg::MANUFACTURER_ID)
    }

    pub fn die_id(&mut self) -> Result<u16> {
        self.read_register(reg::DIE_ID)
    }

    /// Software reset; clears configuration and calibration.
    pub fn reset(&mut self) -> Result<()> {
        self.write_register(reg::CONFIGURATION, CONFIG_RESET)?;
        self.calibration = None;
        Ok(())
    }

    /// Reads (and thereby clears) the conversion-ready flag.
    pub fn is_conversion_ready(&mut self) -> Result<bool> {
        Ok(self.read_register(reg::MASK_ENABLE)? & CVRF != 0)
    }

    fn probe(&mut self, address: u8) -> Result<()> {
        self.address = address;
        let id = self
            .manufacturer_id()
            .map_err(|_| HwError::NoDevice { address })?;
        if id != MANUFACTURER_ID_TI {
            return Err(HwError::UnexpectedDevice {
                address,
                manufacturer_id: id,
            });
        }
        let config = self.config.register_value();
        self.write_register(reg::CONFIGURATION, config)?;
        debug!(address, config, "ina226 initialized");
        Ok(())
    }

    fn lsb_a(&self) -> Result<f64> {
        self.calibration
            .map(|c| c.current_lsb_a)
            .ok_or(HwError::NotCalibrated)
    }
}

impl<B: I2cBus> CurrentSensor for Ina226<B> {
    fn initialize(&mut self, address: u8) -> std::result::Result<(), BoxError> {
        Ok(self.probe(address)?)
    }

    fn calibrate(
        &mut self,
        max_current_a: f32,
        shunt_ohms: f32,
    ) -> std::result::Result<SensorCalibration, CalibrationError> {
        let cal = Ina226Calibration::compute(max_current_a, shunt_ohms, self.config.normalize_lsb)?;
        self.write_register(reg::CALIBRATION, cal.register)
            .map_err(|e| CalibrationError::Bus(e.to_string()))?;
        debug!(
            register = cal.register,
            current_lsb_ma = cal.current_lsb_ma(),
            "ina226 calibrated"
        );
        self.calibration = Some(cal);
        Ok(cal.into())
    }

    fn wait_conversion_ready(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Readiness, BoxError> {
        let poll_interval = self.config.poll_interval;
        Ok(poll_until_ready(
            || self.is_conversion_ready(),
            timeout,
            poll_interval,
        )?)
    }

    fn read_bus_voltage(&mut self) -> std::result::Result<f32, BoxError> {
        let raw = self.read_register(reg::BUS_VOLTAGE)?;
        Ok((f64::from(raw) * BUS_LSB_V) as f32)
    }

    fn read_shunt_voltage(&mut self) -> std::result::Result<f32, BoxError> {
        let raw = self.read_register(reg::SHUNT_VOLTAGE)? as i16;
        Ok((f64::from(raw) * SHUNT_LSB_V * 1_000.0) as f32)
    }

    fn read_current(&mut self) -> std::result::Result<f32, BoxError> {
        let lsb = self.lsb_a()?;
        let raw = self.read_register(reg::CURRENT)? as i16;
        Ok((f64::from(raw) * lsb * 1_000.0) as f32)
    }

    fn read_power(&mut self) -> std::result::Result<f32, BoxError> {
        let lsb = self.lsb_a()?;
        let raw = self.read_register(reg::POWER)?;
        Ok((f64::from(raw) * lsb * POWER_LSB_FACTOR * 1_000.0) as f32)
    }
}
