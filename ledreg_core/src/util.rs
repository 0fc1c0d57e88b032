//! Common time/period helpers for ledreg_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Compute the control period in milliseconds for a given rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 millisecond.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Milliseconds to fractional seconds for display.
#[inline]
pub fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / MILLIS_PER_SEC as f64
}
