#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core regulation logic (hardware-agnostic).
//!
//! All hardware access goes through `ledreg_traits::CurrentSensor`, `Dac` and
//! `SenseInput`, so the same loop runs against the INA226/MCP4725 drivers,
//! the simulated bus, or test doubles.
//!
//! ## Architecture
//!
//! - **Startup**: sensor reachability and calibration (`startup`)
//! - **Control**: fixed-cadence proportional loop with overcurrent cutoff (`controller`)
//! - **Actuator**: DAC writes and sense-voltage diagnostics (`actuator`)
//! - **Intake**: line assembly and target parsing (`command`)
//! - **Telemetry**: tab-separated readings (`telemetry`)
//! - **Run loop**: ties the above together on one thread (`runner`)

pub mod actuator;
pub mod builder;
pub mod command;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod runner;
pub mod startup;
pub mod telemetry;
pub mod util;

pub use actuator::Actuator;
pub use builder::{Missing, RegulatorBuilder, Set};
pub use command::{CommandIntake, LineAssembler, TargetCommand, parse_target_command};
pub use config::{ControlCfg, DacRange, SafetyCfg, SenseScale, StartupCfg, TelemetryCfg, Timeouts};
pub use controller::{ControllerState, Measurement, Mode, RegulatorCore, TickOutcome};
pub use error::{BuildError, CommandError, RegulatorError, StartupError};
pub use runner::{RunEvent, RunLimits, RunSummary, StopReason, run};
pub use startup::bring_up;
pub use telemetry::{TelemetryCursor, TelemetryReporter};
