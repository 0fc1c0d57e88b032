//! Run loop: commands, control ticks and telemetry on one thread.
//!
//! Each iteration drains pending command lines, runs `tick()`, reports the
//! outcome, then sleeps until the next control period. The loop ends on the
//! shutdown flag or a configured limit and always leaves the output at zero.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{self as xch, TryRecvError};
use eyre::WrapErr;
use ledreg_traits::{CurrentSensor, Dac, SenseInput};

use crate::command::{IntakeItem, parse_target_command};
use crate::controller::{Mode, RegulatorCore, TickOutcome};
use crate::error::{CommandError, Result};
use crate::telemetry::TelemetryReporter;

/// Optional bounds on a run. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Stop after this many due ticks.
    pub max_ticks: Option<u64>,
    /// Stop after this much uptime has passed since the run started.
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    TickLimit,
    DurationLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    TargetChanged {
        from_ma: f32,
        to_ma: f32,
    },
    /// Operator input refused; state untouched.
    Rejected {
        line: Option<String>,
        error: CommandError,
    },
    /// A due tick and the DAC value after it.
    Tick {
        dac: u16,
        outcome: TickOutcome,
    },
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub adjustments: u64,
    pub safety_trips: u64,
    pub rejected: u64,
    pub final_target_ma: f32,
    pub final_dac: u16,
    pub stop: StopReason,
}

struct Counters {
    ticks: u64,
    adjustments: u64,
    safety_trips: u64,
    rejected: u64,
}

/// Drive `core` until `shutdown` is set or a limit is hit.
///
/// The caller brings the output to a known state (`core.shutdown()`) before
/// calling. An actuator failure ends the run with an error after a
/// best-effort zero write.
pub fn run<S, D, A, W>(
    core: &mut RegulatorCore<S, D, A>,
    commands: &xch::Receiver<IntakeItem>,
    mut telemetry: Option<&mut TelemetryReporter<W>>,
    shutdown: &AtomicBool,
    limits: RunLimits,
    mut on_event: impl FnMut(&RunEvent),
) -> Result<RunSummary>
where
    S: CurrentSensor,
    D: Dac,
    A: SenseInput,
    W: std::io::Write,
{
    let start_ms = core.uptime_ms();
    let mut input_open = true;
    let mut n = Counters {
        ticks: 0,
        adjustments: 0,
        safety_trips: 0,
        rejected: 0,
    };
    tracing::info!(?limits, "regulator running");

    let stop = loop {
        if shutdown.load(Ordering::Relaxed) {
            break StopReason::Interrupted;
        }

        if input_open {
            input_open = drain_commands(
                core,
                commands,
                telemetry.as_deref_mut(),
                &mut n,
                &mut on_event,
            );
        }

        let outcome = match core.tick() {
            Ok(o) => o,
            Err(e) => {
                if let Err(z) = core.shutdown() {
                    tracing::error!(error = %z, "zero write after actuator failure also failed");
                }
                return Err(e.wrap_err("control tick"));
            }
        };

        if outcome != TickOutcome::NotDue {
            n.ticks += 1;
            match &outcome {
                TickOutcome::Adjusted { .. } => n.adjustments += 1,
                TickOutcome::SafetyShutdown { .. } => n.safety_trips += 1,
                _ => {}
            }
            if let (Some(m), Some(t)) = (outcome.measurement(), telemetry.as_deref_mut())
                && let Err(e) = t.record(core.dac_value(), m)
            {
                tracing::warn!(error = %e, "telemetry write failed");
            }
            on_event(&RunEvent::Tick {
                dac: core.dac_value(),
                outcome,
            });
        }

        if limits.max_ticks.is_some_and(|max| n.ticks >= max) {
            break StopReason::TickLimit;
        }
        if limits
            .duration_ms
            .is_some_and(|d| core.uptime_ms().saturating_sub(start_ms) >= d)
        {
            break StopReason::DurationLimit;
        }

        let wait = core.time_until_next_tick();
        core.clock().sleep(wait);
    };

    core.shutdown().wrap_err("zeroing output on exit")?;
    tracing::info!(?stop, ticks = n.ticks, "regulator stopped");

    Ok(RunSummary {
        ticks: n.ticks,
        adjustments: n.adjustments,
        safety_trips: n.safety_trips,
        rejected: n.rejected,
        final_target_ma: core.target_ma(),
        final_dac: core.dac_value(),
        stop,
    })
}

/// Apply every queued line. Returns false once the input side is gone.
fn drain_commands<S, D, A, W>(
    core: &mut RegulatorCore<S, D, A>,
    commands: &xch::Receiver<IntakeItem>,
    mut telemetry: Option<&mut TelemetryReporter<W>>,
    n: &mut Counters,
    on_event: &mut impl FnMut(&RunEvent),
) -> bool
where
    S: CurrentSensor,
    D: Dac,
    A: SenseInput,
    W: std::io::Write,
{
    loop {
        let (line, parsed) = match commands.try_recv() {
            Ok(Ok(line)) => {
                let parsed = parse_target_command(&line, core.max_current_ma());
                (Some(line), parsed)
            }
            Ok(Err(e)) => (None, Err(e)),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("command input closed");
                on_event(&RunEvent::InputClosed);
                return false;
            }
        };

        let applied = parsed.and_then(|cmd| {
            let from_ma = core.target_ma();
            let was_idle = core.mode() == Mode::Idle;
            core.set_target(cmd.target_ma())?;
            if was_idle
                && core.mode() == Mode::Regulating
                && let Some(t) = telemetry.as_deref_mut()
            {
                t.reset();
            }
            Ok(RunEvent::TargetChanged {
                from_ma,
                to_ma: core.target_ma(),
            })
        });

        match applied {
            Ok(ev) => on_event(&ev),
            Err(CommandError::Empty) => {}
            Err(error) => {
                tracing::warn!(%error, ?line, "command rejected");
                n.rejected += 1;
                on_event(&RunEvent::Rejected { line, error });
            }
        }
    }
}
