//! Human-readable error descriptions and structured JSON error formatting.

use ledreg_core::error::{BuildError, CommandError, RegulatorError, StartupError};
use ledreg_traits::CalibrationError;

pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_SENSOR_UNREACHABLE: i32 = 3;
pub const EXIT_CALIBRATION: i32 = 4;
pub const EXIT_ACTUATOR: i32 = 5;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<StartupError>() {
        return match se {
            StartupError::SensorUnreachable { address, reason } => format!(
                "What happened: The current sensor did not answer at I2C address {address:#04x} ({reason}).\nLikely causes: Wrong sensor.address, SDA/SCL swapped, missing pull-ups, or no power on the INA226.\nHow to fix: Check wiring and power, confirm the address with i2cdetect, then fix [sensor] address in the config."
            ),
            StartupError::Calibration(CalibrationError::ShuntVoltageTooHigh { shunt_voltage_v }) => format!(
                "What happened: The configured range would put {shunt_voltage_v:.3} V across the shunt, above the sensor's 0.080 V limit.\nLikely causes: sensor.max_current_a too high for sensor.shunt_ohms.\nHow to fix: Lower max_current_a or use a smaller shunt so that max_current_a x shunt_ohms <= 0.080."
            ),
            StartupError::Calibration(ce) => format!(
                "What happened: Sensor calibration failed ({ce}).\nLikely causes: Out-of-range shunt or current settings, or a bus fault while writing the calibration register.\nHow to fix: Review [sensor] shunt_ohms and max_current_a, check the bus, then restart."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor | BuildError::MissingActuator => format!(
                "What happened: The regulator was assembled incompletely ({be}).\nLikely causes: A driver failed to initialize before assembly.\nHow to fix: Re-run with --log-level=debug and check the startup messages."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(RegulatorError::Actuator(reason)) = err.downcast_ref::<RegulatorError>() {
        return format!(
            "What happened: Writing the DAC failed ({reason}); the output was driven to zero where possible.\nLikely causes: MCP4725 unplugged, wrong actuator.address, or bus noise.\nHow to fix: Check the DAC wiring and address, then restart."
        );
    }

    if let Some(ce) = err.downcast_ref::<CommandError>() {
        return format!(
            "What happened: The initial target was rejected ({ce}).\nLikely causes: --target-ma is negative or above safety.max_current_ma.\nHow to fix: Pass a target between 0 and the configured safety limit."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("reading config") {
        return format!(
            "What happened: {msg}.\nLikely causes: Wrong --config path or missing file permissions.\nHow to fix: Pass --config with a readable TOML file."
        );
    }

    if lower.contains("parsing config") || lower.contains("invalid config") {
        let cause = err
            .chain()
            .nth(1)
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        return format!(
            "What happened: Configuration is invalid or incomplete{cause}.\nLikely causes: Missing [sensor] or [safety] sections, or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("hardware` feature") {
        return format!(
            "What happened: {msg}.\nLikely causes: The binary was built without hardware support.\nHow to fix: Rebuild with `--features hardware` or set hardware.backend = \"simulated\"."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.chain().nth(1) {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for the fatal classes; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<StartupError>() {
        return match se {
            StartupError::SensorUnreachable { .. } => EXIT_SENSOR_UNREACHABLE,
            StartupError::Calibration(_) => EXIT_CALIBRATION,
        };
    }
    if let Some(RegulatorError::Actuator(_)) = err.downcast_ref::<RegulatorError>() {
        return EXIT_ACTUATOR;
    }
    EXIT_GENERIC
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        EXIT_SENSOR_UNREACHABLE => "SensorUnreachable",
        EXIT_CALIBRATION => "Calibration",
        EXIT_ACTUATOR => "Actuator",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "event": "error",
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
