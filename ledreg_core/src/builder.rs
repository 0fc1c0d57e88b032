//! Type-state builder for `RegulatorCore`.
//!
//! `build()` only exists once a sensor and an actuator have been supplied.
//! `try_build()` is always available and reports the missing piece instead.

use std::marker::PhantomData;
use std::sync::Arc;

use ledreg_traits::{Clock, CurrentSensor, Dac, MonotonicClock, SenseInput, SensorCalibration};

use crate::actuator::Actuator;
use crate::config::{ControlCfg, DacRange, SafetyCfg, Timeouts};
use crate::controller::{ControllerState, RegulatorCore};
use crate::error::{BuildError, Result};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct RegulatorBuilder<S, D, A, SS = Missing, AS = Missing> {
    sensor: Option<S>,
    actuator: Option<Actuator<D, A>>,
    control: Option<ControlCfg>,
    safety: Option<SafetyCfg>,
    range: Option<DacRange>,
    timeouts: Option<Timeouts>,
    calibration: Option<SensorCalibration>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _s: PhantomData<SS>,
    _a: PhantomData<AS>,
}

impl<S, D, A> Default for RegulatorBuilder<S, D, A, Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            actuator: None,
            control: None,
            safety: None,
            range: None,
            timeouts: None,
            calibration: None,
            clock: None,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<S, D, A> RegulatorBuilder<S, D, A, Missing, Missing> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S, D, A> RegulatorCore<S, D, A> {
    /// Start building a regulator.
    pub fn builder() -> RegulatorBuilder<S, D, A, Missing, Missing> {
        RegulatorBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate configuration and construct a `RegulatorCore` with an initial
/// idle state (target 0, output 0, no tick yet).
#[allow(clippy::too_many_arguments)]
fn validate_and_build<S, D, A>(
    sensor: S,
    actuator: Actuator<D, A>,
    control: ControlCfg,
    safety: SafetyCfg,
    range: DacRange,
    timeouts: Timeouts,
    calibration: Option<SensorCalibration>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<RegulatorCore<S, D, A>>
where
    S: CurrentSensor,
    D: Dac,
    A: SenseInput,
{
    if control.rate_hz == 0 {
        return Err(invalid("rate_hz must be > 0"));
    }
    if !(control.kp.is_finite() && control.kp > 0.0) {
        return Err(invalid("kp must be finite and > 0"));
    }
    if control.min_adjustment == 0 {
        return Err(invalid("min_adjustment must be >= 1"));
    }
    if !(safety.max_current_ma.is_finite() && safety.max_current_ma > 0.0) {
        return Err(invalid("max_current_ma must be finite and > 0"));
    }
    if range.min > range.max {
        return Err(invalid("dac range min must be <= max"));
    }
    if let Some(cal) = calibration
        && safety.max_current_ma > cal.max_current_ma
    {
        return Err(invalid(
            "max_current_ma exceeds the calibrated sensor range",
        ));
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();

    Ok(RegulatorCore {
        sensor,
        actuator,
        control,
        safety,
        range,
        timeouts,
        calibration,
        clock,
        epoch,
        period_ms: crate::util::period_ms(control.rate_hz),
        state: ControllerState {
            target_ma: 0.0,
            dac_value: 0,
            last_control_ms: None,
        },
        zero_pending: false,
    })
}

impl<S, D, A, SS, AS> RegulatorBuilder<S, D, A, SS, AS>
where
    S: CurrentSensor,
    D: Dac,
    A: SenseInput,
{
    /// Fallible build available in any type-state; reports the missing piece.
    pub fn try_build(self) -> Result<RegulatorCore<S, D, A>> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        validate_and_build(
            sensor,
            actuator,
            self.control.unwrap_or_default(),
            self.safety.unwrap_or_default(),
            self.range.unwrap_or_default(),
            self.timeouts.unwrap_or_default(),
            self.calibration,
            self.clock,
        )
    }
}

/// Chainable setters that do not affect type-state.
impl<S, D, A, SS, AS> RegulatorBuilder<S, D, A, SS, AS> {
    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.control = Some(control);
        self
    }
    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.safety = Some(safety);
        self
    }
    pub fn with_dac_range(mut self, range: DacRange) -> Self {
        self.range = Some(range);
        self
    }
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
    /// Result of sensor bring-up; the safety limit is checked against it.
    pub fn with_calibration(mut self, calibration: SensorCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<S, D, A, AS> RegulatorBuilder<S, D, A, Missing, AS> {
    pub fn with_sensor(self, sensor: S) -> RegulatorBuilder<S, D, A, Set, AS> {
        RegulatorBuilder {
            sensor: Some(sensor),
            actuator: self.actuator,
            control: self.control,
            safety: self.safety,
            range: self.range,
            timeouts: self.timeouts,
            calibration: self.calibration,
            clock: self.clock,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<S, D, A, SS> RegulatorBuilder<S, D, A, SS, Missing> {
    pub fn with_actuator(self, actuator: Actuator<D, A>) -> RegulatorBuilder<S, D, A, SS, Set> {
        RegulatorBuilder {
            sensor: self.sensor,
            actuator: Some(actuator),
            control: self.control,
            safety: self.safety,
            range: self.range,
            timeouts: self.timeouts,
            calibration: self.calibration,
            clock: self.clock,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<S, D, A> RegulatorBuilder<S, D, A, Set, Set>
where
    S: CurrentSensor,
    D: Dac,
    A: SenseInput,
{
    /// Validate and build. Only available once sensor and actuator are set.
    pub fn build(self) -> Result<RegulatorCore<S, D, A>> {
        self.try_build()
    }
}
