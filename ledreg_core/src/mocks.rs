//! Test doubles for the hardware seams.
//!
//! Handles are cheap clones sharing state, so a test keeps one and hands
//! the other to the regulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ledreg_traits::{
    BoxError, CalibrationError, CurrentSensor, Dac, Readiness, SenseInput, SensorCalibration,
};

/// What `ScriptedSensor` reports. Edit through `ScriptedSensor::script()`.
#[derive(Debug, Clone)]
pub struct SensorScript {
    pub current_ma: f32,
    pub bus_voltage_v: f32,
    pub shunt_ohms: f32,
    pub readiness: Readiness,
    pub fail_current: bool,
    pub fail_aux: bool,
    pub unreachable: bool,
    pub calibration_error: Option<CalibrationError>,
    pub current_reads: u64,
}

impl Default for SensorScript {
    fn default() -> Self {
        Self {
            current_ma: 0.0,
            bus_voltage_v: 5.0,
            shunt_ohms: 0.05,
            readiness: Readiness::Ready,
            fail_current: false,
            fail_aux: false,
            unreachable: false,
            calibration_error: None,
            current_reads: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedSensor {
    script: Arc<Mutex<SensorScript>>,
}

impl ScriptedSensor {
    pub fn new(current_ma: f32) -> Self {
        let s = Self::default();
        s.set_current(current_ma);
        s
    }

    pub fn script(&self) -> MutexGuard<'_, SensorScript> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_current(&self, ma: f32) {
        self.script().current_ma = ma;
    }
}

impl CurrentSensor for ScriptedSensor {
    fn initialize(&mut self, address: u8) -> Result<(), BoxError> {
        if self.script().unreachable {
            return Err(format!("no device acknowledged at i2c address {address:#04x}").into());
        }
        Ok(())
    }

    fn calibrate(
        &mut self,
        max_current_a: f32,
        shunt_ohms: f32,
    ) -> Result<SensorCalibration, CalibrationError> {
        let mut s = self.script();
        if let Some(e) = s.calibration_error.clone() {
            return Err(e);
        }
        s.shunt_ohms = shunt_ohms;
        Ok(SensorCalibration {
            shunt_ohms,
            max_current_ma: max_current_a * 1000.0,
            current_lsb_ma: max_current_a * 1000.0 / 32_768.0,
        })
    }

    fn wait_conversion_ready(&mut self, _timeout: Duration) -> Result<Readiness, BoxError> {
        Ok(self.script().readiness)
    }

    fn read_bus_voltage(&mut self) -> Result<f32, BoxError> {
        let s = self.script();
        if s.fail_aux {
            return Err("bus voltage read failed".into());
        }
        Ok(s.bus_voltage_v)
    }

    fn read_shunt_voltage(&mut self) -> Result<f32, BoxError> {
        let s = self.script();
        if s.fail_aux {
            return Err("shunt voltage read failed".into());
        }
        Ok(s.current_ma * s.shunt_ohms)
    }

    fn read_current(&mut self) -> Result<f32, BoxError> {
        let mut s = self.script();
        s.current_reads += 1;
        if s.fail_current {
            return Err("current read failed".into());
        }
        Ok(s.current_ma)
    }

    fn read_power(&mut self) -> Result<f32, BoxError> {
        let s = self.script();
        if s.fail_aux {
            return Err("power read failed".into());
        }
        Ok(s.current_ma * s.bus_voltage_v)
    }
}

/// DAC that records every write; its sense input echoes the last write.
#[derive(Debug, Clone, Default)]
pub struct RecordingDac {
    writes: Arc<Mutex<Vec<u16>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingDac {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<u16> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<u16> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl Dac for RecordingDac {
    fn set_output(&mut self, value: u16) -> Result<(), BoxError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err("dac write failed".into());
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
        Ok(())
    }
}

impl SenseInput for RecordingDac {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        Ok(self.last().unwrap_or(0))
    }
}
