//! Runtime configuration for the regulator.
//!
//! These are the structs `RegulatorCore` works with; they are separate from
//! the TOML-deserialized schema in `ledreg_config`.

/// Proportional control parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCfg {
    /// Control ticks per second.
    pub rate_hz: u32,
    /// DAC codes per mA of error.
    pub kp: f32,
    /// Steps smaller than this (in DAC codes) are held.
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

/// Absolute overcurrent cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyCfg {
    /// Measured current strictly above this trips the shutdown; also the
    /// largest target accepted.
    pub max_current_ma: f32,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            max_current_ma: 1400.0,
        }
    }
}

/// Legal DAC window. Every value written lies inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacRange {
    pub min: u16,
    pub max: u16,
}

impl Default for DacRange {
    fn default() -> Self {
        Self { min: 0, max: 4095 }
    }
}

impl DacRange {
    #[inline]
    pub fn clamp(&self, value: i64) -> u16 {
        value.clamp(i64::from(self.min), i64::from(self.max)) as u16
    }
}

/// Raw-to-volts conversion of the sense input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SenseScale {
    pub vref_v: f32,
    pub max_raw: u16,
}

impl Default for SenseScale {
    fn default() -> Self {
        Self {
            vref_v: 3.3,
            max_raw: 4095,
        }
    }
}

impl SenseScale {
    pub fn to_volts(&self, raw: u16) -> f32 {
        f32::from(raw) * self.vref_v / f32::from(self.max_raw.max(1))
    }
}

/// Sensor wait policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Wait for conversion-ready before reading.
    pub wait_for_conversion: bool,
    /// Bound on that wait (ms).
    pub conversion_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            wait_for_conversion: true,
            conversion_ms: 600,
        }
    }
}

/// Sensor bring-up parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartupCfg {
    pub sensor_address: u8,
    pub max_current_a: f32,
    pub shunt_ohms: f32,
}

impl Default for StartupCfg {
    fn default() -> Self {
        Self {
            sensor_address: 0x40,
            max_current_a: 1.5,
            shunt_ohms: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryCfg {
    pub enabled: bool,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dac_range_clamps_both_rails() {
        let r = DacRange { min: 10, max: 100 };
        assert_eq!(r.clamp(-5), 10);
        assert_eq!(r.clamp(50), 50);
        assert_eq!(r.clamp(1_000), 100);
    }

    #[test]
    fn sense_scale_full_scale_is_vref() {
        let s = SenseScale::default();
        assert!((s.to_volts(4095) - 3.3).abs() < 1e-6);
        assert_eq!(s.to_volts(0), 0.0);
    }
}
