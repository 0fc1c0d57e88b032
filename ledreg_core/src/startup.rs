//! Sensor bring-up: reach the device, then calibrate it.
//!
//! Both steps are fatal on failure. A wiring or configuration defect needs
//! the operator, so nothing here retries.

use ledreg_traits::{CurrentSensor, SensorCalibration};

use crate::config::StartupCfg;
use crate::error::StartupError;

pub fn bring_up<S: CurrentSensor>(
    sensor: &mut S,
    cfg: &StartupCfg,
) -> Result<SensorCalibration, StartupError> {
    sensor
        .initialize(cfg.sensor_address)
        .map_err(|e| StartupError::SensorUnreachable {
            address: cfg.sensor_address,
            reason: e.to_string(),
        })?;
    tracing::info!(address = cfg.sensor_address, "current sensor reachable");

    let cal = sensor.calibrate(cfg.max_current_a, cfg.shunt_ohms)?;
    tracing::info!(
        current_lsb_ma = cal.current_lsb_ma,
        shunt_ohms = cal.shunt_ohms,
        max_current_ma = cal.max_current_ma,
        "sensor calibrated"
    );
    Ok(cal)
}
