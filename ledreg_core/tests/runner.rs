use std::io::Cursor;
use std::sync::atomic::AtomicBool;

use crossbeam_channel::{Receiver, Sender, unbounded};
use ledreg_core::command::IntakeItem;
use ledreg_core::mocks::{RecordingDac, ScriptedSensor};
use ledreg_core::{
    Actuator, CommandError, CommandIntake, DacRange, RegulatorCore, RegulatorError, RunEvent, RunLimits,
    RunSummary, SafetyCfg, SenseScale, StopReason, TelemetryReporter, TickOutcome, run,
};
use ledreg_traits::ManualClock;

type Core = RegulatorCore<ScriptedSensor, RecordingDac, RecordingDac>;

fn core(sensor: &ScriptedSensor, dac: &RecordingDac) -> Core {
    RegulatorCore::builder()
        .with_sensor(sensor.clone())
        .with_actuator(Actuator::new(dac.clone(), dac.clone(), SenseScale::default()))
        .with_safety(SafetyCfg::default())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap()
}

fn ticks(n: u64) -> RunLimits {
    RunLimits {
        max_ticks: Some(n),
        duration_ms: None,
    }
}

fn channel(lines: &[IntakeItem]) -> (Sender<IntakeItem>, Receiver<IntakeItem>) {
    let (tx, rx) = unbounded();
    for l in lines {
        tx.send(l.clone()).unwrap();
    }
    (tx, rx)
}

fn drive(
    core: &mut Core,
    rx: &Receiver<IntakeItem>,
    stop: &AtomicBool,
    limits: RunLimits,
) -> (RunSummary, Vec<RunEvent>) {
    let mut events = Vec::new();
    let summary = run::<_, _, _, Vec<u8>>(core, rx, None, stop, limits, |e| {
        events.push(e.clone())
    })
    .unwrap();
    (summary, events)
}

#[test]
fn garbage_line_is_rejected_and_regulation_continues() {
    let sensor = ScriptedSensor::new(100.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    core.set_target(200.0).unwrap();
    let (_tx, rx) = channel(&[Ok("abc".into())]);

    let (summary, events) = drive(&mut core, &rx, &AtomicBool::new(false), ticks(1));

    assert_eq!(
        events[0],
        RunEvent::Rejected {
            line: Some("abc".into()),
            error: CommandError::NotANumber("abc".into()),
        }
    );
    match &events[1] {
        RunEvent::Tick {
            dac: 10,
            outcome:
                TickOutcome::Adjusted {
                    from: 0,
                    to: 10,
                    measurement,
                },
        } => assert_eq!(measurement.current_ma, 100.0),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.adjustments, 1);
    assert_eq!(summary.stop, StopReason::TickLimit);
    // Leaving the loop zeroes the output.
    assert_eq!(summary.final_dac, 0);
    assert_eq!(summary.final_target_ma, 0.0);
    assert_eq!(dac.writes(), vec![10, 0]);
}

#[test]
fn overlong_and_out_of_range_lines_are_rejected() {
    let sensor = ScriptedSensor::new(0.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    let (_tx, rx) = channel(&[
        Err(CommandError::LineTooLong { limit: 64 }),
        Ok("1500".into()),
        Ok("-3".into()),
    ]);

    let (summary, events) = drive(&mut core, &rx, &AtomicBool::new(false), ticks(1));

    assert_eq!(summary.rejected, 3);
    assert_eq!(
        events[0],
        RunEvent::Rejected {
            line: None,
            error: CommandError::LineTooLong { limit: 64 },
        }
    );
    assert!(matches!(
        &events[1],
        RunEvent::Rejected {
            error: CommandError::AboveMaximum { .. },
            ..
        }
    ));
    assert!(matches!(
        &events[2],
        RunEvent::Rejected {
            error: CommandError::Negative(_),
            ..
        }
    ));
}

#[test]
fn blank_lines_are_ignored_silently() {
    let sensor = ScriptedSensor::new(0.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    let (_tx, rx) = channel(&[Ok(String::new()), Ok("   ".into())]);

    let (summary, events) = drive(&mut core, &rx, &AtomicBool::new(false), ticks(1));

    assert_eq!(summary.rejected, 0);
    assert_eq!(
        events,
        vec![RunEvent::Tick {
            dac: 0,
            outcome: TickOutcome::Idle
        }]
    );
}

#[test]
fn target_changes_are_reported_in_order() {
    let sensor = ScriptedSensor::new(0.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    let (_tx, rx) = channel(&[Ok("250".into()), Ok("0".into())]);

    let (_, events) = drive(&mut core, &rx, &AtomicBool::new(false), ticks(1));

    assert_eq!(
        events[..2],
        [
            RunEvent::TargetChanged {
                from_ma: 0.0,
                to_ma: 250.0
            },
            RunEvent::TargetChanged {
                from_ma: 250.0,
                to_ma: 0.0
            },
        ]
    );
    assert_eq!(
        events[2],
        RunEvent::Tick {
            dac: 0,
            outcome: TickOutcome::Idle
        }
    );
}

#[test]
fn preset_shutdown_flag_stops_before_any_tick() {
    let sensor = ScriptedSensor::new(0.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    let (_tx, rx) = channel(&[]);

    let (summary, events) = drive(&mut core, &rx, &AtomicBool::new(true), RunLimits::default());

    assert_eq!(summary.stop, StopReason::Interrupted);
    assert_eq!(summary.ticks, 0);
    assert!(events.is_empty());
    assert_eq!(dac.writes(), vec![0]);
}

#[test]
fn duration_limit_counts_simulated_time() {
    let sensor = ScriptedSensor::new(0.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    let (_tx, rx) = channel(&[]);
    let limits = RunLimits {
        max_ticks: None,
        duration_ms: Some(1_000),
    };

    let (summary, _) = drive(&mut core, &rx, &AtomicBool::new(false), limits);

    assert_eq!(summary.stop, StopReason::DurationLimit);
    // Ticks at 0, 100, ..., 1000 ms.
    assert_eq!(summary.ticks, 11);
    assert_eq!(core.uptime_ms(), 1_000);
}

#[test]
fn closed_input_is_reported_once_and_the_loop_keeps_going() {
    let sensor = ScriptedSensor::new(100.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    core.set_target(200.0).unwrap();
    let (tx, rx) = channel(&[Ok("150".into())]);
    drop(tx);

    let (summary, events) = drive(&mut core, &rx, &AtomicBool::new(false), ticks(3));

    let closed = events
        .iter()
        .filter(|e| **e == RunEvent::InputClosed)
        .count();
    assert_eq!(closed, 1);
    assert_eq!(
        events[0],
        RunEvent::TargetChanged {
            from_ma: 200.0,
            to_ma: 150.0
        }
    );
    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.adjustments, 3);
}

#[test]
fn actuator_failure_ends_the_run_with_context() {
    let sensor = ScriptedSensor::new(100.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    core.set_target(200.0).unwrap();
    dac.set_failing(true);
    let (_tx, rx) = channel(&[]);

    let err = run::<_, _, _, Vec<u8>>(
        &mut core,
        &rx,
        None,
        &AtomicBool::new(false),
        ticks(5),
        |_| {},
    )
    .unwrap_err();

    let chain = format!("{err:#}");
    assert!(chain.contains("control tick"), "{chain}");
    assert!(chain.contains("setting dac output to 10"), "{chain}");
    assert!(matches!(
        err.downcast_ref::<RegulatorError>(),
        Some(RegulatorError::Actuator(_))
    ));
    assert_eq!(core.target_ma(), 0.0);
}

#[test]
fn safety_trips_are_counted_and_leave_the_loop_idle() {
    let sensor = ScriptedSensor::new(1500.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    core.set_target(1000.0).unwrap();
    let (_tx, rx) = channel(&[]);

    let (summary, events) = drive(&mut core, &rx, &AtomicBool::new(false), ticks(3));

    assert_eq!(summary.safety_trips, 1);
    assert!(matches!(
        events[0],
        RunEvent::Tick {
            dac: 0,
            outcome: TickOutcome::SafetyShutdown { .. }
        }
    ));
    assert!(events[1..].iter().all(|e| *e
        == RunEvent::Tick {
            dac: 0,
            outcome: TickOutcome::Idle
        }));
}

#[test]
fn telemetry_lines_follow_measurements() {
    let sensor = ScriptedSensor::new(100.0);
    let dac = RecordingDac::new();
    let mut core = core(&sensor, &dac);
    core.set_target(200.0).unwrap();
    let (_tx, rx) = channel(&[]);
    let mut telemetry = TelemetryReporter::new(Vec::new(), 10);

    run(
        &mut core,
        &rx,
        Some(&mut telemetry),
        &AtomicBool::new(false),
        ticks(2),
        |_| {},
    )
    .unwrap();

    let text = String::from_utf8(telemetry.into_inner().unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("10\t0.008\t0.00\t5.000\t5.000\t100.00\t500.00"));
    assert!(lines[2].starts_with("20\t"));
}

#[test]
fn intake_thread_delivers_lines_then_disconnects() {
    let intake = CommandIntake::spawn(Cursor::new(b"100\r\nabc\n42".to_vec()), 4);
    let rx = intake.receiver();
    assert_eq!(rx.recv().unwrap(), Ok("100".to_string()));
    assert_eq!(rx.recv().unwrap(), Ok("abc".to_string()));
    assert_eq!(rx.recv().unwrap(), Ok("42".to_string()));
    assert!(rx.recv().is_err());
}

#[test]
fn ticks_pinned_at_the_rail_do_not_count_as_adjustments() {
    let sensor = ScriptedSensor::new(0.0);
    let dac = RecordingDac::new();
    let mut core = RegulatorCore::builder()
        .with_sensor(sensor.clone())
        .with_actuator(Actuator::new(dac.clone(), dac.clone(), SenseScale::default()))
        .with_safety(SafetyCfg::default())
        .with_dac_range(DacRange { min: 0, max: 50 })
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    core.set_target(1000.0).unwrap();
    let (_tx, rx) = channel(&[]);

    let (summary, _) = drive(&mut core, &rx, &AtomicBool::new(false), ticks(4));

    assert_eq!(summary.ticks, 4);
    assert_eq!(summary.adjustments, 1);
    assert_eq!(dac.writes(), vec![50, 0]);
}
