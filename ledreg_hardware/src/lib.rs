//! Device drivers and simulation for the LED current regulator.
//!
//! - `ina226`: current/voltage/power monitor (sensor side)
//! - `mcp4725`: 12-bit DAC (actuator side, readback doubles as sense input)
//! - `sim`: in-process bus emulating both parts against an LED load model
//! - `linux_i2c`: `rppal` bus backend, behind the `hardware` feature
pub mod calibration;
pub mod error;
pub mod ina226;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod linux_i2c;
pub mod mcp4725;
pub mod shared;
pub mod sim;
pub mod util;

pub use calibration::Ina226Calibration;
pub use error::HwError;
pub use ina226::{Averaging, ConversionTime, Ina226, Ina226Config};
pub use mcp4725::Mcp4725;
pub use shared::SharedBus;
pub use sim::{LoadModel, SimulatedBus};

/// Sensor and DAC drivers sharing the simulated bus, plus a handle to poke it.
pub fn simulated_pair(
    load: LoadModel,
    sensor_config: Ina226Config,
    sensor_address: u8,
    dac_address: u8,
) -> (
    Ina226<SharedBus<SimulatedBus>>,
    Mcp4725<SharedBus<SimulatedBus>>,
    SharedBus<SimulatedBus>,
) {
    let bus = SharedBus::new(SimulatedBus::new(load).with_addresses(sensor_address, dac_address));
    let sensor = Ina226::new(bus.clone(), sensor_config);
    let dac = Mcp4725::new(bus.clone(), dac_address);
    (sensor, dac, bus)
}
