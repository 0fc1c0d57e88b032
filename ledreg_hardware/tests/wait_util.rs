use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use ledreg_hardware::error::HwError;
use ledreg_hardware::util::poll_until_ready;
use ledreg_traits::Readiness;

#[test]
fn becomes_ready_before_timeout() {
    let ready = Arc::new(AtomicBool::new(false));
    let ready_bg = ready.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        ready_bg.store(true, Ordering::Relaxed);
    });

    let res = poll_until_ready(
        || Ok(ready.load(Ordering::Relaxed)),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert_eq!(res.expect("poll ok"), Readiness::Ready);
}

#[test]
fn times_out_without_spinning_forever() {
    let start = Instant::now();
    let res = poll_until_ready(
        || Ok(false),
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect("poll ok");
    assert_eq!(res, Readiness::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn zero_timeout_polls_once() {
    let polls = AtomicUsize::new(0);
    let res = poll_until_ready(
        || {
            polls.fetch_add(1, Ordering::Relaxed);
            Ok(false)
        },
        Duration::ZERO,
        Duration::from_millis(1),
    )
    .expect("poll ok");
    assert_eq!(res, Readiness::NotReady);
    assert_eq!(polls.load(Ordering::Relaxed), 1);
}

#[test]
fn bus_errors_propagate() {
    let err = poll_until_ready(
        || Err(HwError::Bus("nak".into())),
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("bus error");
    assert!(matches!(err, HwError::Bus(_)));
}
