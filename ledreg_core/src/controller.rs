//! The control loop (`RegulatorCore`).
//!
//! One value owns the sensor, the actuator and all controller state. The run
//! loop calls `tick()` as often as it likes; the core decides whether a
//! control period has elapsed and performs at most one control update per
//! period:
//!
//! 1. optional bounded wait for a fresh conversion,
//! 2. current read and overcurrent check,
//! 3. proportional step with a dead-band,
//! 4. clamped DAC write and diagnostic sense read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ledreg_traits::{
    BoxError, Clock, CurrentSensor, Dac, Readiness, SenseInput, SensorCalibration,
};

use crate::actuator::Actuator;
use crate::config::{ControlCfg, DacRange, SafetyCfg, Timeouts};
use crate::error::{CommandError, RegulatorError, Result};
use crate::hw_error::map_hw_error;

/// Mutable controller state. Changed only by `tick()` and `set_target()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub target_ma: f32,
    pub dac_value: u16,
    /// Uptime (ms) of the last due tick; `None` until the first one.
    pub last_control_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Regulating,
}

/// One tick's readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub bus_voltage_v: f32,
    pub shunt_voltage_mv: f32,
    pub current_ma: f32,
    pub power_mw: f32,
    /// Sense voltage after the write; `None` when the read failed.
    pub dac_voltage_v: Option<f32>,
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Target is zero; output held at zero.
    Idle,
    /// Control period has not elapsed yet.
    NotDue,
    Adjusted {
        from: u16,
        to: u16,
        measurement: Measurement,
    },
    /// Step inside the dead-band; output unchanged.
    Held { measurement: Measurement },
    /// No usable data this period.
    Skipped(RegulatorError),
    /// Overcurrent: target and output forced to zero this tick.
    SafetyShutdown { measured_ma: f32, limit_ma: f32 },
}

impl TickOutcome {
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            Self::Adjusted { measurement, .. } | Self::Held { measurement } => Some(measurement),
            _ => None,
        }
    }
}

pub struct RegulatorCore<S, D, A> {
    pub(crate) sensor: S,
    pub(crate) actuator: Actuator<D, A>,
    pub(crate) control: ControlCfg,
    pub(crate) safety: SafetyCfg,
    pub(crate) range: DacRange,
    pub(crate) timeouts: Timeouts,
    pub(crate) calibration: Option<SensorCalibration>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) period_ms: u64,
    pub(crate) state: ControllerState,
    /// A zero write failed and must be retried.
    pub(crate) zero_pending: bool,
}

impl<S, D, A> core::fmt::Debug for RegulatorCore<S, D, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegulatorCore")
            .field("state", &self.state)
            .field("period_ms", &self.period_ms)
            .field("zero_pending", &self.zero_pending)
            .finish_non_exhaustive()
    }
}

impl<S: CurrentSensor, D: Dac, A: SenseInput> RegulatorCore<S, D, A> {
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn target_ma(&self) -> f32 {
        self.state.target_ma
    }

    pub fn dac_value(&self) -> u16 {
        self.state.dac_value
    }

    pub fn mode(&self) -> Mode {
        if self.state.target_ma > 0.0 {
            Mode::Regulating
        } else {
            Mode::Idle
        }
    }

    pub fn max_current_ma(&self) -> f32 {
        self.safety.max_current_ma
    }

    pub fn calibration(&self) -> Option<&SensorCalibration> {
        self.calibration.as_ref()
    }

    pub fn control_cfg(&self) -> &ControlCfg {
        &self.control
    }

    pub fn dac_range(&self) -> DacRange {
        self.range
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }

    /// Milliseconds since the regulator was built.
    pub fn uptime_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Change the target current.
    ///
    /// Invalid values are rejected without touching state. Zero drives the
    /// output to zero right away instead of waiting for the next tick; if that
    /// write fails, idle ticks keep retrying it.
    pub fn set_target(&mut self, target_ma: f32) -> std::result::Result<(), CommandError> {
        let max = self.safety.max_current_ma;
        if !target_ma.is_finite() {
            return Err(CommandError::NonFinite);
        }
        if target_ma < 0.0 {
            return Err(CommandError::Negative(target_ma));
        }
        if target_ma > max {
            return Err(CommandError::AboveMaximum {
                value: target_ma,
                max,
            });
        }

        let previous = self.state.target_ma;
        self.state.target_ma = target_ma;
        if target_ma == 0.0 {
            if let Err(e) = self.zero_output() {
                tracing::warn!(error = %e, "zero write failed; retrying on next tick");
            }
        }
        tracing::info!(from_ma = previous, to_ma = target_ma, "target changed");
        Ok(())
    }

    /// Force target and output to zero and write the output.
    pub fn shutdown(&mut self) -> Result<()> {
        self.state.target_ma = 0.0;
        self.zero_output()
    }

    fn zero_output(&mut self) -> Result<()> {
        self.state.dac_value = 0;
        self.zero_pending = true;
        self.actuator.set_output(0)?;
        self.zero_pending = false;
        Ok(())
    }

    fn is_due(&self, now_ms: u64) -> bool {
        self.state
            .last_control_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.period_ms)
    }

    /// Time left before the next tick is due (zero when due now).
    pub fn time_until_next_tick(&self) -> Duration {
        let Some(last) = self.state.last_control_ms else {
            return Duration::ZERO;
        };
        let elapsed = self.uptime_ms().saturating_sub(last);
        Duration::from_millis(self.period_ms.saturating_sub(elapsed))
    }

    /// Run one control period if due.
    ///
    /// Transient sensor problems come back as `Skipped`. An `Err` means the
    /// actuator could not be written, which the caller treats as fatal.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let now = self.uptime_ms();
        if !self.is_due(now) {
            return Ok(TickOutcome::NotDue);
        }
        self.state.last_control_ms = Some(now);

        if self.mode() == Mode::Idle {
            if self.zero_pending {
                match self.zero_output() {
                    Ok(()) => tracing::info!("pending zero write completed"),
                    Err(e) => tracing::warn!(error = %e, "zero write retry failed"),
                }
            }
            return Ok(TickOutcome::Idle);
        }

        if self.timeouts.wait_for_conversion {
            let timeout = Duration::from_millis(self.timeouts.conversion_ms);
            match self.sensor.wait_conversion_ready(timeout) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::NotReady) => return Ok(self.skip(RegulatorError::NotReady)),
                Ok(Readiness::TimedOut) => return Ok(self.skip(RegulatorError::Timeout)),
                Err(e) => return Ok(self.skip(map_hw_error(&*e))),
            }
        }

        let current_ma = match self.sensor.read_current() {
            Ok(v) => v,
            Err(e) => return Ok(self.skip(map_hw_error(&*e))),
        };

        let limit_ma = self.safety.max_current_ma;
        if current_ma > limit_ma {
            tracing::error!(measured_ma = current_ma, limit_ma, "overcurrent, output forced to 0");
            self.shutdown()?;
            return Ok(TickOutcome::SafetyShutdown {
                measured_ma: current_ma,
                limit_ma,
            });
        }

        let (bus_voltage_v, shunt_voltage_mv, power_mw) = match self.read_aux() {
            Ok(r) => r,
            Err(e) => return Ok(self.skip(map_hw_error(&*e))),
        };

        let step = self.step_for(self.state.target_ma - current_ma);
        let from = self.state.dac_value;
        let to = self.range.clamp(i64::from(from).saturating_add(step));
        // A step swallowed by the range clamp is a hold: no write, no adjustment.
        let applied =
            step.unsigned_abs() >= u64::from(self.control.min_adjustment) && to != from;
        if applied {
            self.actuator.set_output(to)?;
            self.state.dac_value = to;
        }

        let dac_voltage_v = match self.actuator.read_sense_voltage() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "sense read failed");
                None
            }
        };

        let measurement = Measurement {
            bus_voltage_v,
            shunt_voltage_mv,
            current_ma,
            power_mw,
            dac_voltage_v,
            uptime_ms: now,
        };
        tracing::debug!(
            target_ma = self.state.target_ma,
            current_ma,
            step,
            dac = self.state.dac_value,
            "control tick"
        );

        Ok(if applied {
            TickOutcome::Adjusted {
                from,
                to: self.state.dac_value,
                measurement,
            }
        } else {
            TickOutcome::Held { measurement }
        })
    }

    /// Bus voltage, shunt voltage and power, in that order.
    fn read_aux(&mut self) -> std::result::Result<(f32, f32, f32), BoxError> {
        Ok((
            self.sensor.read_bus_voltage()?,
            self.sensor.read_shunt_voltage()?,
            self.sensor.read_power()?,
        ))
    }

    /// `trunc(error * kp)`, toward zero. Saturates instead of wrapping.
    fn step_for(&self, error_ma: f32) -> i64 {
        let raw = error_ma * self.control.kp;
        if raw.is_finite() {
            raw.trunc() as i64
        } else {
            0
        }
    }

    fn skip(&self, reason: RegulatorError) -> TickOutcome {
        tracing::warn!(%reason, "control tick skipped");
        TickOutcome::Skipped(reason)
    }
}
