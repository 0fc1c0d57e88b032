//! Simulated I2C bus hosting an INA226 and an MCP4725 wired to an LED load.
//!
//! The load turns the DAC code into a current; the INA226 registers are
//! derived from that current the same way the real part derives them, so the
//! drivers run unmodified against it.

use ledreg_traits::{BoxError, I2cBus};
use tracing::trace;

use crate::error::HwError;
use crate::ina226::{self, BUS_LSB_V, CVRF, MANUFACTURER_ID_TI, SHUNT_LSB_V, reg};
use crate::mcp4725;

const DIE_ID: u16 = 0x2260;
const CONFIG_POWER_ON: u16 = 0x4127;

/// Gate-driven LED load: no current below the threshold, linear above it.
#[derive(Debug, Clone, Copy)]
pub struct LoadModel {
    /// DAC code at which the transistor starts conducting.
    pub threshold_code: u16,
    /// Additional milliamps per DAC code above the threshold.
    pub ma_per_code: f32,
    /// Voltage seen on the INA226 bus pin.
    pub bus_voltage_v: f32,
    pub shunt_ohms: f32,
}

impl Default for LoadModel {
    fn default() -> Self {
        Self {
            threshold_code: 800,
            ma_per_code: 0.5,
            bus_voltage_v: 5.0,
            shunt_ohms: 0.05,
        }
    }
}

impl LoadModel {
    pub fn current_ma(&self, code: u16) -> f32 {
        f32::from(code.saturating_sub(self.threshold_code)) * self.ma_per_code
    }
}

#[derive(Debug)]
pub struct SimulatedBus {
    load: LoadModel,
    sensor_address: u8,
    dac_address: u8,
    config: u16,
    calibration: u16,
    dac_code: u16,
    /// Forces the load current regardless of the DAC code.
    current_override_ma: Option<f32>,
    /// Conversion-ready never asserts while set.
    conversion_stalled: bool,
    /// Every transaction fails while set.
    offline: bool,
    transactions: u64,
}

impl SimulatedBus {
    pub fn new(load: LoadModel) -> Self {
        Self {
            load,
            sensor_address: ina226::DEFAULT_ADDRESS,
            dac_address: mcp4725::DEFAULT_ADDRESS,
            config: CONFIG_POWER_ON,
            calibration: 0,
            dac_code: 0,
            current_override_ma: None,
            conversion_stalled: false,
            offline: false,
            transactions: 0,
        }
    }

    pub fn with_addresses(mut self, sensor: u8, dac: u8) -> Self {
        self.sensor_address = sensor;
        self.dac_address = dac;
        self
    }

    pub fn load(&self) -> &LoadModel {
        &self.load
    }

    pub fn dac_code(&self) -> u16 {
        self.dac_code
    }

    pub fn calibration_register(&self) -> u16 {
        self.calibration
    }

    pub fn config_register(&self) -> u16 {
        self.config
    }

    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    pub fn set_current_override(&mut self, ma: Option<f32>) {
        self.current_override_ma = ma;
    }

    pub fn set_conversion_stalled(&mut self, stalled: bool) {
        self.conversion_stalled = stalled;
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    fn load_current_a(&self) -> f64 {
        let ma = self
            .current_override_ma
            .unwrap_or_else(|| self.load.current_ma(self.dac_code));
        f64::from(ma) / 1_000.0
    }

    fn shunt_raw(&self) -> i16 {
        let v = self.load_current_a() * f64::from(self.load.shunt_ohms);
        (v / SHUNT_LSB_V)
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }

    fn bus_raw(&self) -> u16 {
        (f64::from(self.load.bus_voltage_v) / BUS_LSB_V)
            .round()
            .clamp(0.0, f64::from(u16::MAX)) as u16
    }

    /// Current register as the device computes it: shunt x CAL / 2048.
    fn current_raw(&self) -> i16 {
        let raw = i64::from(self.shunt_raw()) * i64::from(self.calibration) / 2048;
        raw.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
    }

    /// Power register: current x bus / 20000.
    fn power_raw(&self) -> u16 {
        let raw = i64::from(self.current_raw()).abs() * i64::from(self.bus_raw()) / 20_000;
        raw.clamp(0, i64::from(u16::MAX)) as u16
    }

    fn sensor_register(&self, register: u8) -> Result<u16, HwError> {
        Ok(match register {
            reg::CONFIGURATION => self.config,
            reg::SHUNT_VOLTAGE => self.shunt_raw() as u16,
            reg::BUS_VOLTAGE => self.bus_raw(),
            reg::POWER => self.power_raw(),
            reg::CURRENT => self.current_raw() as u16,
            reg::CALIBRATION => self.calibration,
            reg::MASK_ENABLE => {
                if self.conversion_stalled {
                    0
                } else {
                    CVRF
                }
            }
            reg::ALERT_LIMIT => 0,
            reg::MANUFACTURER_ID => MANUFACTURER_ID_TI,
            reg::DIE_ID => DIE_ID,
            other => return Err(HwError::Bus(format!("no register {other:#04x}"))),
        })
    }

    fn write_sensor(&mut self, bytes: &[u8]) -> Result<(), HwError> {
        let [register, hi, lo] = bytes else {
            return Err(HwError::Bus(format!(
                "ina226 write expects 3 bytes, got {}",
                bytes.len()
            )));
        };
        let value = u16::from_be_bytes([*hi, *lo]);
        match *register {
            reg::CONFIGURATION => {
                if value & ina226::CONFIG_RESET != 0 {
                    self.config = CONFIG_POWER_ON;
                    self.calibration = 0;
                } else {
                    self.config = value;
                }
            }
            reg::CALIBRATION => self.calibration = value & 0x7FFF,
            reg::MASK_ENABLE | reg::ALERT_LIMIT => {}
            other => return Err(HwError::Bus(format!("register {other:#04x} is read-only"))),
        }
        Ok(())
    }

    fn write_dac(&mut self, bytes: &[u8]) -> Result<(), HwError> {
        self.dac_code = match bytes {
            // Fast mode: power-down bits in the upper nibble are ignored here.
            [hi, lo] => (u16::from(hi & 0x0F) << 8) | u16::from(*lo),
            // Write-DAC-register command: D11..D4, D3..D0 in the high nibble.
            [0x40, hi, lo] => (u16::from(*hi) << 4) | (u16::from(*lo) >> 4),
            _ => {
                return Err(HwError::Bus(format!(
                    "unsupported mcp4725 frame of {} bytes",
                    bytes.len()
                )));
            }
        };
        Ok(())
    }

    fn check(&mut self, address: u8) -> Result<(), HwError> {
        self.transactions += 1;
        if self.offline || (address != self.sensor_address && address != self.dac_address) {
            return Err(HwError::NoDevice { address });
        }
        Ok(())
    }
}

impl I2cBus for SimulatedBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BoxError> {
        self.check(address)?;
        trace!(address, ?bytes, "sim i2c write");
        if address == self.sensor_address {
            self.write_sensor(bytes)?;
        } else {
            self.write_dac(bytes)?;
        }
        Ok(())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BoxError> {
        self.check(address)?;
        if address == self.sensor_address {
            return Err(HwError::Bus("ina226 reads need a register pointer".into()).into());
        }
        let code = self.dac_code;
        let frame = [0xC0, (code >> 4) as u8, ((code & 0x0F) << 4) as u8, 0, 0];
        for (dst, src) in buf.iter_mut().zip(frame) {
            *dst = src;
        }
        Ok(())
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buf: &mut [u8]) -> Result<(), BoxError> {
        self.check(address)?;
        if address != self.sensor_address {
            return Err(HwError::Bus("mcp4725 has no register pointer".into()).into());
        }
        let [register] = bytes else {
            return Err(HwError::Bus("expected a single pointer byte".into()).into());
        };
        let [hi, lo] = self.sensor_register(*register)?.to_be_bytes();
        if let Some(b) = buf.get_mut(0) {
            *b = hi;
        }
        if let Some(b) = buf.get_mut(1) {
            *b = lo;
        }
        Ok(())
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new(LoadModel::default())
    }
}
