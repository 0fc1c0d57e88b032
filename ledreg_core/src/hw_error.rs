//! Maps `Box<dyn Error>` from trait boundaries to typed `RegulatorError`.
//!
//! The traits in `ledreg_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed enum, with an optional feature-gated
//! path for `ledreg_hardware::HwError` downcasting.

use crate::error::RegulatorError;

/// Map a trait-boundary error to a typed `RegulatorError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> RegulatorError {
    #[cfg(feature = "hardware-errors")]
    {
        use ledreg_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Bus(s) => RegulatorError::Hardware(s.clone()),
                HwError::NotCalibrated => RegulatorError::State(hw.to_string()),
                other => RegulatorError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        RegulatorError::Timeout
    } else {
        RegulatorError::Hardware(s)
    }
}
