#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Configuration schema for the LED current regulator.
//!
//! `Config` and its sections are deserialized from TOML and checked by
//! `validate()`. Only `[sensor]` and `[safety]` are required; every other
//! section falls back to the bench defaults.
use serde::Deserialize;

/// Datasheet limit for the INA226 shunt input.
pub const MAX_SHUNT_VOLTAGE_V: f32 = 0.080;
/// Full-scale code of a 12-bit DAC.
pub const DAC_12BIT_MAX: u16 = 4095;

#[derive(Debug, Deserialize)]
pub struct SensorCfg {
    /// 7-bit I2C address (TOML accepts `0x40`).
    #[serde(default = "default_sensor_address")]
    pub address: u8,
    pub shunt_ohms: f32,
    /// Measurable range the calibration is sized for (amps).
    pub max_current_a: f32,
    /// Samples averaged per conversion: 1, 4, 16, 64, 128, 256, 512 or 1024.
    #[serde(default = "default_averaging")]
    pub averaging: u16,
    #[serde(default = "default_conversion_us")]
    pub bus_conversion_us: u32,
    #[serde(default = "default_conversion_us")]
    pub shunt_conversion_us: u32,
    /// Wait for conversion-ready before each tick. Disabled means read whatever is latched.
    #[serde(default = "default_true")]
    pub wait_for_conversion: bool,
    /// Upper bound on the conversion-ready wait.
    #[serde(default = "default_conversion_timeout_ms")]
    pub conversion_timeout_ms: u64,
    /// Round the current LSB to a 1/2/5 step.
    #[serde(default = "default_true")]
    pub normalize_lsb: bool,
}

fn default_sensor_address() -> u8 {
    0x40
}
fn default_averaging() -> u16 {
    16
}
fn default_conversion_us() -> u32 {
    1100
}
fn default_conversion_timeout_ms() -> u64 {
    600
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ActuatorCfg {
    pub address: u8,
    pub dac_min: u16,
    pub dac_max: u16,
    /// Reference voltage of the sense input (full scale).
    pub sense_vref_v: f32,
    /// Raw count corresponding to `sense_vref_v`.
    pub sense_max_raw: u16,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            address: 0x60,
            dac_min: 0,
            dac_max: DAC_12BIT_MAX,
            sense_vref_v: 3.3,
            sense_max_raw: DAC_12BIT_MAX,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Control ticks per second.
    pub rate_hz: u32,
    /// Proportional gain (DAC codes per mA of error).
    pub kp: f32,
    /// Smallest step (DAC codes) that is applied; smaller ones are held.
    pub min_adjustment: u16,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            rate_hz: 10,
            kp: 0.1,
            min_adjustment: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Safety {
    /// Absolute overcurrent cutoff (mA). Also the largest accepted target.
    pub max_current_ma: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryCfg {
    pub enabled: bool,
    /// Reprint the column header after this many data lines.
    pub header_every: u32,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            header_every: 10,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process bus with an LED load model.
    #[default]
    Simulated,
    /// Linux `/dev/i2c-N` via rppal (needs the `hardware` feature).
    Linux,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    pub backend: Backend,
    /// I2C bus number for the Linux backend.
    pub i2c_bus: u8,
    /// Sleep between conversion-ready polls (microseconds).
    pub poll_interval_us: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            backend: Backend::Simulated,
            i2c_bus: 1,
            poll_interval_us: 1000,
        }
    }
}

/// LED load used by the simulated backend.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    pub threshold_code: u16,
    pub ma_per_code: f32,
    pub bus_voltage_v: f32,
    /// Address the simulated INA226 answers at; defaults to `sensor.address`.
    /// Setting a different one reproduces a miswired or dead sensor.
    pub sensor_address: Option<u8>,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            threshold_code: 800,
            ma_per_code: 0.5,
            bus_voltage_v: 5.0,
            sensor_address: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub sensor: SensorCfg,
    #[serde(default)]
    pub actuator: ActuatorCfg,
    #[serde(default)]
    pub control: ControlCfg,
    pub safety: Safety,
    #[serde(default)]
    pub telemetry: TelemetryCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

const AVERAGING_COUNTS: [u16; 8] = [1, 4, 16, 64, 128, 256, 512, 1024];
const CONVERSION_TIMES_US: [u32; 8] = [140, 204, 332, 588, 1100, 2116, 4156, 8244];

fn is_i2c_address(a: u8) -> bool {
    // 0x00..=0x07 and 0x78..=0x7F are reserved.
    (0x08..=0x77).contains(&a)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        let s = &self.sensor;
        if !is_i2c_address(s.address) {
            eyre::bail!("sensor.address {:#04x} is not a 7-bit I2C address", s.address);
        }
        if !(s.shunt_ohms.is_finite() && s.shunt_ohms > 0.0) {
            eyre::bail!("sensor.shunt_ohms must be > 0");
        }
        if !(s.max_current_a.is_finite() && s.max_current_a > 0.0) {
            eyre::bail!("sensor.max_current_a must be > 0");
        }
        if s.shunt_ohms * s.max_current_a > MAX_SHUNT_VOLTAGE_V {
            eyre::bail!(
                "sensor.max_current_a x sensor.shunt_ohms = {:.3} V exceeds the 0.080 V shunt range",
                s.shunt_ohms * s.max_current_a
            );
        }
        if !AVERAGING_COUNTS.contains(&s.averaging) {
            eyre::bail!("sensor.averaging must be one of {AVERAGING_COUNTS:?}");
        }
        if !CONVERSION_TIMES_US.contains(&s.bus_conversion_us) {
            eyre::bail!("sensor.bus_conversion_us must be one of {CONVERSION_TIMES_US:?}");
        }
        if !CONVERSION_TIMES_US.contains(&s.shunt_conversion_us) {
            eyre::bail!("sensor.shunt_conversion_us must be one of {CONVERSION_TIMES_US:?}");
        }
        if s.conversion_timeout_ms > 10_000 {
            eyre::bail!("sensor.conversion_timeout_ms is unreasonably large (>10s)");
        }

        // Actuator
        let a = &self.actuator;
        if !is_i2c_address(a.address) {
            eyre::bail!("actuator.address {:#04x} is not a 7-bit I2C address", a.address);
        }
        if a.address == s.address {
            eyre::bail!("actuator.address must differ from sensor.address");
        }
        if a.dac_max > DAC_12BIT_MAX {
            eyre::bail!("actuator.dac_max must be <= {DAC_12BIT_MAX}");
        }
        if a.dac_min > a.dac_max {
            eyre::bail!("actuator.dac_min must be <= actuator.dac_max");
        }
        if !(a.sense_vref_v.is_finite() && a.sense_vref_v > 0.0) {
            eyre::bail!("actuator.sense_vref_v must be > 0");
        }
        if a.sense_max_raw == 0 {
            eyre::bail!("actuator.sense_max_raw must be >= 1");
        }

        // Control
        if self.control.rate_hz == 0 {
            eyre::bail!("control.rate_hz must be > 0");
        }
        if self.control.rate_hz > 1000 {
            eyre::bail!("control.rate_hz must be <= 1000");
        }
        if !(self.control.kp.is_finite() && self.control.kp > 0.0) {
            eyre::bail!("control.kp must be > 0");
        }
        if self.control.min_adjustment == 0 {
            eyre::bail!("control.min_adjustment must be >= 1");
        }

        // Safety
        let max_ma = self.safety.max_current_ma;
        if !(max_ma.is_finite() && max_ma > 0.0) {
            eyre::bail!("safety.max_current_ma must be > 0");
        }
        if max_ma > s.max_current_a * 1000.0 {
            eyre::bail!(
                "safety.max_current_ma ({max_ma}) must not exceed the sensor range ({} mA)",
                s.max_current_a * 1000.0
            );
        }

        // Telemetry
        if self.telemetry.header_every == 0 {
            eyre::bail!("telemetry.header_every must be >= 1");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // Hardware
        if self.hardware.poll_interval_us == 0 {
            eyre::bail!("hardware.poll_interval_us must be >= 1");
        }

        // Simulation
        let sim = &self.simulation;
        if !(sim.ma_per_code.is_finite() && sim.ma_per_code > 0.0) {
            eyre::bail!("simulation.ma_per_code must be > 0");
        }
        if !(sim.bus_voltage_v.is_finite() && (0.0..=36.0).contains(&sim.bus_voltage_v)) {
            eyre::bail!("simulation.bus_voltage_v must be in [0, 36]");
        }
        if let Some(a) = sim.sensor_address
            && !is_i2c_address(a)
        {
            eyre::bail!("simulation.sensor_address {a:#04x} is not a valid 7-bit address");
        }

        Ok(())
    }
}
