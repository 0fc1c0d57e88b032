//! INA226 calibration math: current LSB selection and calibration register.

use ledreg_traits::{CalibrationError, SensorCalibration};

/// Largest shunt drop the INA226 measures (rounded from the 81.92 mV full scale).
pub const MAX_SHUNT_VOLTAGE_V: f64 = 0.080;
pub const MIN_MAX_CURRENT_A: f64 = 0.001;
pub const MIN_SHUNT_OHMS: f64 = 0.001;
/// Calibration register must stay below 2^15.
pub const MAX_CALIBRATION: u32 = 32_767;
/// Fixed constant from the INA226 datasheet: CAL = 0.00512 / (LSB * R).
const CAL_SCALE: f64 = 0.00512;
/// Smallest LSB the calibration register can express for a 1 ohm shunt.
const MIN_LSB_OHM: f64 = 1.5625e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ina226Calibration {
    /// Amps per count of the current register.
    pub current_lsb_a: f64,
    /// Value written to the calibration register.
    pub register: u16,
    /// Effective full-scale current (A).
    pub max_current_a: f64,
    pub shunt_ohms: f64,
}

impl Ina226Calibration {
    pub fn compute(
        max_current_a: f32,
        shunt_ohms: f32,
        normalize: bool,
    ) -> Result<Self, CalibrationError> {
        let max_a = f64::from(max_current_a);
        let shunt = f64::from(shunt_ohms);

        let shunt_voltage_v = (max_a * shunt).abs();
        if shunt_voltage_v > MAX_SHUNT_VOLTAGE_V {
            return Err(CalibrationError::ShuntVoltageTooHigh {
                shunt_voltage_v: shunt_voltage_v as f32,
            });
        }
        // Negated comparisons also reject NaN.
        if !(max_a >= MIN_MAX_CURRENT_A) {
            return Err(CalibrationError::MaxCurrentTooLow { max_current_a });
        }
        if !(shunt >= MIN_SHUNT_OHMS) {
            return Err(CalibrationError::ShuntTooLow { shunt_ohms });
        }

        let mut lsb = max_a / 32_768.0;
        if normalize {
            // A tiny shunt can force a coarser LSB than max_current implies.
            lsb = lsb.max(MIN_LSB_OHM / shunt);
            lsb = normalize_lsb(lsb).ok_or(CalibrationError::NormalizationFailed)?;
        }

        let mut cal = (CAL_SCALE / (lsb * shunt)).round() as u32;
        while cal > MAX_CALIBRATION {
            lsb *= 2.0;
            cal >>= 1;
        }

        Ok(Self {
            current_lsb_a: lsb,
            register: cal as u16,
            max_current_a: lsb * 32_768.0,
            shunt_ohms: shunt,
        })
    }

    pub fn current_lsb_ma(&self) -> f64 {
        self.current_lsb_a * 1_000.0
    }
}

impl From<Ina226Calibration> for SensorCalibration {
    fn from(c: Ina226Calibration) -> Self {
        Self {
            shunt_ohms: c.shunt_ohms as f32,
            max_current_ma: (c.max_current_a * 1_000.0) as f32,
            current_lsb_ma: c.current_lsb_ma() as f32,
        }
    }
}

/// Round an LSB (amps) up to the next 1/2/5 x 10^k microamp step, k in 0..=3.
///
/// Returns None when the LSB needs more than 5000 uA.
pub fn normalize_lsb(lsb_a: f64) -> Option<f64> {
    if !lsb_a.is_finite() || lsb_a < 0.0 {
        return None;
    }
    // Truncate then bump by one: always lands strictly above the raw LSB.
    let lsb_ua = (lsb_a * 1e6) as u64 + 1;
    let mut factor = 1u64;
    for _ in 0..4 {
        for m in [1u64, 2, 5] {
            if m * factor >= lsb_ua {
                return Some((m * factor) as f64 * 1e-6);
            }
        }
        factor *= 10;
    }
    None
}
