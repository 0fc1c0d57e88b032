//! Hardware assembly and the `run` / `self-check` commands.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::{Result, WrapErr, eyre};
use ledreg_config::{Backend, Config, Hardware, SensorCfg};
use ledreg_core::{
    Actuator, CommandIntake, DacRange, RegulatorCore, RunEvent, RunLimits, RunSummary, SafetyCfg,
    SenseScale, StartupCfg, StopReason, TelemetryCfg, TelemetryReporter, TickOutcome, Timeouts, bring_up,
};
use ledreg_hardware::{
    Averaging, ConversionTime, Ina226, Ina226Config, LoadModel, Mcp4725, SharedBus, SimulatedBus,
};
use ledreg_traits::{CurrentSensor, I2cBus, SensorCalibration};
use serde_json::json;

use crate::cli::json_mode;

/// Bounded queue between the stdin reader and the control thread.
const COMMAND_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOpts {
    pub target_ma: Option<f32>,
    pub limits: RunLimits,
}

pub fn ina226_config(sensor: &SensorCfg, hw: &Hardware) -> Result<Ina226Config> {
    let averaging = Averaging::from_count(sensor.averaging)
        .ok_or_else(|| eyre!("sensor.averaging {} is not supported", sensor.averaging))?;
    let conversion = |us: u32, key: &str| {
        ConversionTime::from_micros(us).ok_or_else(|| eyre!("sensor.{key} {us} is not supported"))
    };
    Ok(Ina226Config {
        averaging,
        bus_conversion: conversion(sensor.bus_conversion_us, "bus_conversion_us")?,
        shunt_conversion: conversion(sensor.shunt_conversion_us, "shunt_conversion_us")?,
        poll_interval: Duration::from_micros(hw.poll_interval_us),
        normalize_lsb: sensor.normalize_lsb,
    })
}

pub fn load_model(cfg: &Config) -> LoadModel {
    LoadModel {
        threshold_code: cfg.simulation.threshold_code,
        ma_per_code: cfg.simulation.ma_per_code,
        bus_voltage_v: cfg.simulation.bus_voltage_v,
        shunt_ohms: cfg.sensor.shunt_ohms,
    }
}

/// Work that needs the configured I2C bus, whatever backend provides it.
trait BusTask {
    type Output;
    fn run<B: I2cBus>(self, bus: SharedBus<B>) -> Result<Self::Output>;
}

fn on_bus<T: BusTask>(cfg: &Config, task: T) -> Result<T::Output> {
    match cfg.hardware.backend {
        Backend::Simulated => {
            tracing::info!("using simulated bus");
            let sensor_at = cfg.simulation.sensor_address.unwrap_or(cfg.sensor.address);
            let sim = SimulatedBus::new(load_model(cfg))
                .with_addresses(sensor_at, cfg.actuator.address);
            task.run(SharedBus::new(sim))
        }
        Backend::Linux => {
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            {
                let bus = ledreg_hardware::linux_i2c::LinuxI2c::open(cfg.hardware.i2c_bus)
                    .wrap_err_with(|| format!("opening i2c bus {}", cfg.hardware.i2c_bus))?;
                tracing::info!(bus = cfg.hardware.i2c_bus, "using linux i2c");
                task.run(SharedBus::new(bus))
            }
            #[cfg(not(all(feature = "hardware", target_os = "linux")))]
            {
                let _ = task;
                eyre::bail!(
                    "hardware.backend = \"linux\" needs a Linux build with the `hardware` feature"
                )
            }
        }
    }
}

type BusCore<B> = RegulatorCore<Ina226<SharedBus<B>>, Mcp4725<SharedBus<B>>, Mcp4725<SharedBus<B>>>;

/// Bring the sensor up and assemble a regulator with the output at zero.
fn assemble<B: I2cBus>(cfg: &Config, bus: SharedBus<B>) -> Result<BusCore<B>> {
    let mut sensor = Ina226::new(bus.clone(), ina226_config(&cfg.sensor, &cfg.hardware)?);
    let startup: StartupCfg = (&cfg.sensor).into();
    let cal = bring_up(&mut sensor, &startup)?;
    report_calibration(&startup, &cal);

    let dac = Mcp4725::new(bus.clone(), cfg.actuator.address);
    let sense = Mcp4725::new(bus, cfg.actuator.address);
    let scale: SenseScale = (&cfg.actuator).into();
    let range: DacRange = (&cfg.actuator).into();
    let safety: SafetyCfg = (&cfg.safety).into();
    let timeouts: Timeouts = (&cfg.sensor).into();

    let mut core = RegulatorCore::builder()
        .with_sensor(sensor)
        .with_actuator(Actuator::new(dac, sense, scale))
        .with_control((&cfg.control).into())
        .with_safety(safety)
        .with_dac_range(range)
        .with_timeouts(timeouts)
        .with_calibration(cal)
        .build()?;
    core.shutdown().wrap_err("zeroing output at startup")?;
    Ok(core)
}

struct Regulate<'a> {
    cfg: &'a Config,
    opts: RunOpts,
    shutdown: &'a AtomicBool,
}

impl BusTask for Regulate<'_> {
    type Output = RunSummary;

    fn run<B: I2cBus>(self, bus: SharedBus<B>) -> Result<RunSummary> {
        let mut core = assemble(self.cfg, bus)?;
        if let Some(t) = self.opts.target_ma {
            core.set_target(t).wrap_err("initial target (--target-ma)")?;
        }

        let json = json_mode();
        let tcfg: TelemetryCfg = (&self.cfg.telemetry).into();
        let mut telemetry = (tcfg.enabled && !json)
            .then(|| TelemetryReporter::new(std::io::stdout(), tcfg.header_every));

        let intake = CommandIntake::spawn(std::io::stdin(), COMMAND_QUEUE);
        let summary = ledreg_core::run(
            &mut core,
            intake.receiver(),
            telemetry.as_mut(),
            self.shutdown,
            self.opts.limits,
            |ev| report_event(ev, json),
        )?;
        report_summary(&summary, json);
        Ok(summary)
    }
}

pub fn run_regulator(cfg: &Config, opts: RunOpts, shutdown: &AtomicBool) -> Result<RunSummary> {
    on_bus(
        cfg,
        Regulate {
            cfg,
            opts,
            shutdown,
        },
    )
}

struct SelfCheck<'a> {
    cfg: &'a Config,
}

impl BusTask for SelfCheck<'_> {
    type Output = ();

    fn run<B: I2cBus>(self, bus: SharedBus<B>) -> Result<()> {
        let ina = ina226_config(&self.cfg.sensor, &self.cfg.hardware)?;
        let mut sensor = Ina226::new(bus.clone(), ina);
        let startup: StartupCfg = (&self.cfg.sensor).into();
        let cal = bring_up(&mut sensor, &startup)?;
        report_calibration(&startup, &cal);

        let address = self.cfg.actuator.address;
        let mut actuator = Actuator::new(
            Mcp4725::new(bus.clone(), address),
            Mcp4725::new(bus, address),
            (&self.cfg.actuator).into(),
        );
        actuator.set_output(0)?;
        let sense_v = actuator.read_sense_voltage()?;

        let bus_v = sensor
            .read_bus_voltage()
            .map_err(|e| eyre!("{e}"))
            .wrap_err("reading bus voltage")?;

        if json_mode() {
            println!(
                "{}",
                json!({
                    "event": "self_check",
                    "ok": true,
                    "dac_address": address,
                    "sense_v": sense_v,
                    "bus_v": bus_v,
                })
            );
        } else {
            println!(
                "self-check ok: dac {address:#04x} zeroed (sense {sense_v:.3} V), bus {bus_v:.3} V"
            );
        }
        Ok(())
    }
}

pub fn self_check(cfg: &Config) -> Result<()> {
    on_bus(cfg, SelfCheck { cfg })
}

fn report_calibration(startup: &StartupCfg, cal: &SensorCalibration) {
    if json_mode() {
        println!(
            "{}",
            json!({
                "event": "calibrated",
                "sensor_address": startup.sensor_address,
                "current_lsb_ma": cal.current_lsb_ma,
                "shunt_ohms": cal.shunt_ohms,
                "max_current_ma": cal.max_current_ma,
            })
        );
    } else {
        eprintln!(
            "sensor {:#04x} calibrated: lsb {:.4} mA, shunt {} ohm, range {:.1} mA",
            startup.sensor_address, cal.current_lsb_ma, cal.shunt_ohms, cal.max_current_ma
        );
    }
}

fn outcome_name(o: &TickOutcome) -> &'static str {
    match o {
        TickOutcome::Idle => "idle",
        TickOutcome::NotDue => "not_due",
        TickOutcome::Adjusted { .. } => "adjusted",
        TickOutcome::Held { .. } => "held",
        TickOutcome::Skipped(_) => "skipped",
        TickOutcome::SafetyShutdown { .. } => "safety_shutdown",
    }
}

fn event_json(ev: &RunEvent) -> serde_json::Value {
    match ev {
        RunEvent::TargetChanged { from_ma, to_ma } => {
            json!({ "event": "target", "from_ma": from_ma, "to_ma": to_ma })
        }
        RunEvent::Rejected { line, error } => {
            json!({ "event": "rejected", "line": line, "error": error.to_string() })
        }
        RunEvent::InputClosed => json!({ "event": "input_closed" }),
        RunEvent::Tick { dac, outcome } => {
            let mut obj = json!({ "event": "tick", "outcome": outcome_name(outcome), "dac": dac });
            match outcome {
                TickOutcome::Skipped(reason) => obj["reason"] = json!(reason.to_string()),
                TickOutcome::SafetyShutdown {
                    measured_ma,
                    limit_ma,
                } => {
                    obj["measured_ma"] = json!(measured_ma);
                    obj["limit_ma"] = json!(limit_ma);
                }
                _ => {}
            }
            if let Some(m) = outcome.measurement() {
                obj["uptime_ms"] = json!(m.uptime_ms);
                obj["bus_v"] = json!(m.bus_voltage_v);
                obj["shunt_mv"] = json!(m.shunt_voltage_mv);
                obj["current_ma"] = json!(m.current_ma);
                obj["power_mw"] = json!(m.power_mw);
                obj["dac_v"] = json!(m.dac_voltage_v);
            }
            obj
        }
    }
}

fn report_event(ev: &RunEvent, json: bool) {
    if json {
        println!("{}", event_json(ev));
        return;
    }
    match ev {
        RunEvent::TargetChanged { from_ma, to_ma } => {
            eprintln!("target {from_ma} -> {to_ma} mA");
        }
        RunEvent::Rejected { line, error } => match line {
            Some(l) => eprintln!("rejected {l:?}: {error}"),
            None => eprintln!("rejected input: {error}"),
        },
        RunEvent::Tick {
            outcome:
                TickOutcome::SafetyShutdown {
                    measured_ma,
                    limit_ma,
                },
            ..
        } => {
            eprintln!(
                "SAFETY SHUTDOWN: measured {measured_ma:.1} mA exceeds {limit_ma:.1} mA, output forced to 0"
            );
        }
        RunEvent::Tick { .. } => {}
        RunEvent::InputClosed => eprintln!("command input closed"),
    }
}

fn stop_name(stop: StopReason) -> &'static str {
    match stop {
        StopReason::Interrupted => "interrupted",
        StopReason::TickLimit => "tick_limit",
        StopReason::DurationLimit => "duration_limit",
    }
}

fn report_summary(s: &RunSummary, json: bool) {
    let stop = stop_name(s.stop);
    if json {
        println!(
            "{}",
            json!({
                "event": "stopped",
                "stop": stop,
                "ticks": s.ticks,
                "adjustments": s.adjustments,
                "safety_trips": s.safety_trips,
                "rejected": s.rejected,
                "final_dac": s.final_dac,
            })
        );
    } else {
        eprintln!(
            "stopped ({stop}) after {} ticks: {} adjustments, {} safety trips, {} rejected lines",
            s.ticks, s.adjustments, s.safety_trips, s.rejected
        );
    }
}
