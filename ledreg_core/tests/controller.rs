use std::time::Duration;

use ledreg_core::mocks::{RecordingDac, ScriptedSensor};
use ledreg_core::{
    Actuator, CommandError, ControlCfg, DacRange, Mode, RegulatorCore, RegulatorError, SafetyCfg,
    SenseScale, TickOutcome, Timeouts,
};
use ledreg_traits::{ManualClock, Readiness};
use rstest::rstest;

type Core = RegulatorCore<ScriptedSensor, RecordingDac, RecordingDac>;

struct Rig {
    core: Core,
    sensor: ScriptedSensor,
    dac: RecordingDac,
    clock: ManualClock,
}

fn rig_with(control: ControlCfg, range: DacRange, timeouts: Timeouts) -> Rig {
    let sensor = ScriptedSensor::new(0.0);
    let dac = RecordingDac::new();
    let clock = ManualClock::new();
    let core = RegulatorCore::builder()
        .with_sensor(sensor.clone())
        .with_actuator(Actuator::new(dac.clone(), dac.clone(), SenseScale::default()))
        .with_control(control)
        .with_safety(SafetyCfg {
            max_current_ma: 1400.0,
        })
        .with_dac_range(range)
        .with_timeouts(timeouts)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build regulator");
    Rig {
        core,
        sensor,
        dac,
        clock,
    }
}

fn rig() -> Rig {
    rig_with(
        ControlCfg::default(),
        DacRange::default(),
        Timeouts::default(),
    )
}

impl Rig {
    /// Advance one control period and tick.
    fn next_tick(&mut self) -> TickOutcome {
        self.clock.advance(Duration::from_millis(100));
        self.core.tick().expect("tick")
    }
}

#[test]
fn starts_idle_with_output_at_zero() {
    let mut r = rig();
    assert_eq!(r.core.mode(), Mode::Idle);
    assert_eq!(r.core.dac_value(), 0);
    assert_eq!(r.core.tick().unwrap(), TickOutcome::Idle);
    assert_eq!(r.sensor.script().current_reads, 0);
}

#[test]
fn proportional_step_500_target_300_measured() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);

    match r.core.tick().unwrap() {
        TickOutcome::Adjusted { from, to, measurement } => {
            assert_eq!((from, to), (0, 20));
            assert!((measurement.current_ma - 300.0).abs() < f32::EPSILON);
        }
        other => panic!("expected Adjusted, got {other:?}"),
    }
    // Same error again: the step accumulates on the held value.
    match r.next_tick() {
        TickOutcome::Adjusted { from, to, .. } => assert_eq!((from, to), (20, 40)),
        other => panic!("expected Adjusted, got {other:?}"),
    }
    assert_eq!(r.dac.writes(), vec![20, 40]);
}

#[test]
fn overcurrent_forces_zero_in_the_same_tick() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);
    r.core.tick().unwrap();
    assert_eq!(r.core.dac_value(), 20);

    r.sensor.set_current(1450.0);
    let out = r.next_tick();
    assert_eq!(
        out,
        TickOutcome::SafetyShutdown {
            measured_ma: 1450.0,
            limit_ma: 1400.0
        }
    );
    assert_eq!(r.core.target_ma(), 0.0);
    assert_eq!(r.core.dac_value(), 0);
    assert_eq!(r.dac.last(), Some(0));
    assert_eq!(r.core.mode(), Mode::Idle);
}

#[test]
fn current_exactly_at_limit_does_not_trip() {
    let mut r = rig();
    r.core.set_target(1400.0).unwrap();
    r.sensor.set_current(1400.0);
    assert!(matches!(r.core.tick().unwrap(), TickOutcome::Held { .. }));
    assert_eq!(r.core.target_ma(), 1400.0);
}

#[test]
fn sub_unit_error_is_held() {
    let mut r = rig();
    r.core.set_target(100.0).unwrap();
    r.sensor.set_current(99.5);
    assert!(matches!(r.core.tick().unwrap(), TickOutcome::Held { .. }));
    assert_eq!(r.core.dac_value(), 0);
    assert!(r.dac.writes().is_empty());
}

#[rstest]
// kp * error lands exactly on min_adjustment: applied.
#[case(0.5, 1, 102.0, 100.0, Some(1))]
#[case(0.5, 5, 110.0, 100.0, Some(5))]
// Just below: truncated under the threshold, held.
#[case(0.5, 1, 101.5, 100.0, None)]
#[case(0.5, 5, 109.9, 100.0, None)]
fn dead_band_boundary_is_inclusive(
    #[case] kp: f32,
    #[case] min_adjustment: u16,
    #[case] target: f32,
    #[case] measured: f32,
    #[case] expected_dac: Option<u16>,
) {
    let mut r = rig_with(
        ControlCfg {
            rate_hz: 10,
            kp,
            min_adjustment,
        },
        DacRange::default(),
        Timeouts::default(),
    );
    r.core.set_target(target).unwrap();
    r.sensor.set_current(measured);
    let out = r.core.tick().unwrap();
    match expected_dac {
        Some(v) => {
            assert!(matches!(out, TickOutcome::Adjusted { .. }), "{out:?}");
            assert_eq!(r.core.dac_value(), v);
        }
        None => {
            assert!(matches!(out, TickOutcome::Held { .. }), "{out:?}");
            assert_eq!(r.core.dac_value(), 0);
        }
    }
}

#[test]
fn negative_error_truncates_toward_zero() {
    let mut r = rig();
    r.core.set_target(1000.0).unwrap();
    r.sensor.set_current(0.0);
    r.core.tick().unwrap(); // +100
    r.sensor.set_current(1015.0); // error -15 -> -1.5 -> -1
    match r.next_tick() {
        TickOutcome::Adjusted { from, to, .. } => assert_eq!((from, to), (100, 99)),
        other => panic!("expected Adjusted, got {other:?}"),
    }
}

#[test]
fn output_is_clamped_to_the_dac_window() {
    let mut r = rig_with(
        ControlCfg::default(),
        DacRange { min: 10, max: 100 },
        Timeouts::default(),
    );
    r.core.set_target(1400.0).unwrap();
    r.sensor.set_current(0.0);
    r.core.tick().unwrap(); // +140 -> clamped
    assert_eq!(r.core.dac_value(), 100);

    r.sensor.set_current(1390.0);
    r.core.set_target(100.0).unwrap();
    r.next_tick(); // -129 -> clamped
    assert_eq!(r.core.dac_value(), 10);
    assert_eq!(r.dac.writes(), vec![100, 10]);
}

#[test]
fn output_pinned_at_the_rail_is_held_without_rewrites() {
    let mut r = rig_with(
        ControlCfg::default(),
        DacRange { min: 0, max: 50 },
        Timeouts::default(),
    );
    r.core.set_target(1000.0).unwrap();
    r.sensor.set_current(0.0);
    assert!(matches!(
        r.core.tick().unwrap(),
        TickOutcome::Adjusted { from: 0, to: 50, .. }
    ));

    for _ in 0..3 {
        let out = r.next_tick();
        assert!(matches!(out, TickOutcome::Held { .. }), "{out:?}");
    }
    assert_eq!(r.core.dac_value(), 50);
    assert_eq!(r.dac.writes(), vec![50]);
}

#[test]
fn zero_target_when_idle_is_idempotent() {
    let mut r = rig();
    r.core.set_target(0.0).unwrap();
    assert_eq!(r.core.dac_value(), 0);
    assert_eq!(r.core.tick().unwrap(), TickOutcome::Idle);
    r.core.set_target(0.0).unwrap();
    assert_eq!(r.next_tick(), TickOutcome::Idle);
    assert_eq!(r.core.dac_value(), 0);
    assert!(r.dac.writes().iter().all(|&v| v == 0));
}

#[test]
fn zero_target_writes_immediately_between_ticks() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);
    r.core.tick().unwrap();
    r.core.set_target(0.0).unwrap();
    // No tick in between.
    assert_eq!(r.dac.last(), Some(0));
    assert_eq!(r.core.dac_value(), 0);
}

#[test]
fn failed_zero_write_is_retried_by_idle_ticks() {
    let mut r = rig();
    r.core.set_target(200.0).unwrap();
    r.dac.set_failing(true);
    r.core.set_target(0.0).unwrap();
    assert_eq!(r.core.dac_value(), 0);
    assert!(r.dac.writes().is_empty());

    // Still failing: the idle tick does not error out.
    assert_eq!(r.core.tick().unwrap(), TickOutcome::Idle);
    r.dac.set_failing(false);
    assert_eq!(r.next_tick(), TickOutcome::Idle);
    assert_eq!(r.dac.writes(), vec![0]);
}

#[rstest]
#[case(f32::NAN, CommandError::NonFinite)]
#[case(f32::INFINITY, CommandError::NonFinite)]
#[case(-1.0, CommandError::Negative(-1.0))]
#[case(1400.5, CommandError::AboveMaximum { value: 1400.5, max: 1400.0 })]
fn invalid_targets_leave_state_untouched(#[case] value: f32, #[case] expected: CommandError) {
    let mut r = rig();
    r.core.set_target(200.0).unwrap();
    let before = *r.core.state();
    assert_eq!(r.core.set_target(value), Err(expected));
    assert_eq!(*r.core.state(), before);
}

#[test]
fn first_tick_fires_immediately_then_follows_cadence() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);
    assert_eq!(r.core.time_until_next_tick(), Duration::ZERO);
    assert!(matches!(r.core.tick().unwrap(), TickOutcome::Adjusted { .. }));

    assert_eq!(r.core.tick().unwrap(), TickOutcome::NotDue);
    assert_eq!(r.core.time_until_next_tick(), Duration::from_millis(100));
    r.clock.advance(Duration::from_millis(99));
    assert_eq!(r.core.tick().unwrap(), TickOutcome::NotDue);
    assert_eq!(r.core.time_until_next_tick(), Duration::from_millis(1));
    r.clock.advance(Duration::from_millis(1));
    assert!(matches!(r.core.tick().unwrap(), TickOutcome::Adjusted { .. }));
}

#[rstest]
#[case(Readiness::TimedOut, RegulatorError::Timeout)]
#[case(Readiness::NotReady, RegulatorError::NotReady)]
fn missing_conversion_skips_the_tick(#[case] readiness: Readiness, #[case] reason: RegulatorError) {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);
    r.sensor.script().readiness = readiness;
    assert_eq!(r.core.tick().unwrap(), TickOutcome::Skipped(reason));
    assert_eq!(r.core.dac_value(), 0);
    assert_eq!(r.sensor.script().current_reads, 0);
}

#[test]
fn readiness_is_ignored_when_waiting_is_disabled() {
    let mut r = rig_with(
        ControlCfg::default(),
        DacRange::default(),
        Timeouts {
            wait_for_conversion: false,
            conversion_ms: 600,
        },
    );
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);
    r.sensor.script().readiness = Readiness::TimedOut;
    assert!(matches!(r.core.tick().unwrap(), TickOutcome::Adjusted { .. }));
}

#[test]
fn read_failures_skip_without_adjusting() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);

    r.sensor.script().fail_current = true;
    assert!(matches!(
        r.core.tick().unwrap(),
        TickOutcome::Skipped(RegulatorError::Hardware(_))
    ));

    r.sensor.script().fail_current = false;
    r.sensor.script().fail_aux = true;
    assert!(matches!(r.next_tick(), TickOutcome::Skipped(_)));
    assert_eq!(r.core.dac_value(), 0);
    assert!(r.dac.writes().is_empty());

    r.sensor.script().fail_aux = false;
    assert!(matches!(r.next_tick(), TickOutcome::Adjusted { .. }));
}

#[test]
fn measurement_carries_sense_voltage_after_write() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);
    let out = r.core.tick().unwrap();
    let m = out.measurement().expect("measurement");
    let expected = 20.0 * 3.3 / 4095.0;
    assert!((m.dac_voltage_v.unwrap() - expected).abs() < 1e-6);
    assert!((m.power_mw - 1500.0).abs() < 1e-3);
    assert!((m.shunt_voltage_mv - 15.0).abs() < 1e-4);
    assert_eq!(m.uptime_ms, 0);
}

#[test]
fn actuator_failure_during_regulation_is_an_error() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(300.0);
    r.dac.set_failing(true);
    let err = r.core.tick().expect_err("write must fail");
    let typed = err.downcast_ref::<RegulatorError>().expect("typed");
    assert!(matches!(typed, RegulatorError::Actuator(_)));
    assert_eq!(r.core.dac_value(), 0);
}

#[test]
fn overcurrent_with_dead_actuator_still_clears_state() {
    let mut r = rig();
    r.core.set_target(500.0).unwrap();
    r.sensor.set_current(1450.0);
    r.dac.set_failing(true);
    assert!(r.core.tick().is_err());
    assert_eq!(r.core.target_ma(), 0.0);
    assert_eq!(r.core.dac_value(), 0);
}
