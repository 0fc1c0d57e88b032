//! Gate drive: a DAC plus the sense input wired to its output.

use eyre::WrapErr;
use ledreg_traits::{Dac, SenseInput};

use crate::config::SenseScale;
use crate::error::{RegulatorError, Result};
use crate::hw_error::map_hw_error;

pub struct Actuator<D, A> {
    dac: D,
    sense: A,
    scale: SenseScale,
}

impl<D: Dac, A: SenseInput> Actuator<D, A> {
    pub fn new(dac: D, sense: A, scale: SenseScale) -> Self {
        Self { dac, sense, scale }
    }

    /// Write a DAC code as-is. Range checks belong to the caller.
    pub fn set_output(&mut self, value: u16) -> Result<()> {
        self.dac
            .set_output(value)
            .map_err(|e| eyre::Report::new(RegulatorError::Actuator(map_hw_error(&*e).to_string())))
            .wrap_err_with(|| format!("setting dac output to {value}"))
    }

    /// Diagnostic voltage at the DAC output: `raw * vref / max_raw`.
    pub fn read_sense_voltage(&mut self) -> Result<f32> {
        let raw = self
            .sense
            .read_raw()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading sense input")?;
        Ok(self.scale.to_volts(raw))
    }

    pub fn sense_scale(&self) -> SenseScale {
        self.scale
    }
}
