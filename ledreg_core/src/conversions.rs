//! `From` implementations bridging `ledreg_config` types to `ledreg_core` types.

use crate::config::{
    ControlCfg, DacRange, SafetyCfg, SenseScale, StartupCfg, TelemetryCfg, Timeouts,
};

// ── ControlCfg ───────────────────────────────────────────────────────────────

impl From<&ledreg_config::ControlCfg> for ControlCfg {
    fn from(c: &ledreg_config::ControlCfg) -> Self {
        Self {
            rate_hz: c.rate_hz,
            kp: c.kp,
            min_adjustment: c.min_adjustment,
        }
    }
}

// ── SafetyCfg ────────────────────────────────────────────────────────────────

impl From<&ledreg_config::Safety> for SafetyCfg {
    fn from(c: &ledreg_config::Safety) -> Self {
        Self {
            max_current_ma: c.max_current_ma,
        }
    }
}

// ── Actuator ─────────────────────────────────────────────────────────────────

impl From<&ledreg_config::ActuatorCfg> for DacRange {
    fn from(c: &ledreg_config::ActuatorCfg) -> Self {
        Self {
            min: c.dac_min,
            max: c.dac_max,
        }
    }
}

impl From<&ledreg_config::ActuatorCfg> for SenseScale {
    fn from(c: &ledreg_config::ActuatorCfg) -> Self {
        Self {
            vref_v: c.sense_vref_v,
            max_raw: c.sense_max_raw,
        }
    }
}

// ── Sensor ───────────────────────────────────────────────────────────────────

impl From<&ledreg_config::SensorCfg> for Timeouts {
    fn from(c: &ledreg_config::SensorCfg) -> Self {
        Self {
            wait_for_conversion: c.wait_for_conversion,
            conversion_ms: c.conversion_timeout_ms,
        }
    }
}

impl From<&ledreg_config::SensorCfg> for StartupCfg {
    fn from(c: &ledreg_config::SensorCfg) -> Self {
        Self {
            sensor_address: c.address,
            max_current_a: c.max_current_a,
            shunt_ohms: c.shunt_ohms,
        }
    }
}

// ── Telemetry ────────────────────────────────────────────────────────────────

impl From<&ledreg_config::TelemetryCfg> for TelemetryCfg {
    fn from(c: &ledreg_config::TelemetryCfg) -> Self {
        Self {
            enabled: c.enabled,
            header_every: c.header_every,
        }
    }
}
