use std::time::{Duration, Instant};

use ledreg_traits::Readiness;

use crate::error::Result;

/// Poll `is_ready` until it reports true or `timeout` expires.
///
/// A zero timeout polls exactly once and reports `NotReady` instead of
/// `TimedOut`. Sleeps `poll_interval` between polls to avoid spinning.
pub fn poll_until_ready(
    mut is_ready: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Readiness> {
    if is_ready()? {
        return Ok(Readiness::Ready);
    }
    if timeout.is_zero() {
        return Ok(Readiness::NotReady);
    }
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(Readiness::TimedOut);
        }
        std::thread::sleep(poll_interval.min(deadline - now));
        if is_ready()? {
            return Ok(Readiness::Ready);
        }
    }
}
