//! Maps `Box<dyn Error>` from trait boundaries to typed `ScaleError`.
//!
//! The traits in `scale_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `scale_hardware::HwError` downcasting.

use crate::error::ScaleError;

/// Map a trait-boundary error to a typed `ScaleError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ScaleError {
    #[cfg(feature = "hardware-errors")]
    {
        use scale_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => ScaleError::Timeout,
                HwError::Exception(code) => ScaleError::Exception(code.clone()),
                HwError::ShortRead { .. } => ScaleError::Decode(hw.to_string()),
                HwError::InvalidParams(msg) => ScaleError::Config(msg.clone()),
                other => ScaleError::Link(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ScaleError::Timeout
    } else {
        ScaleError::Link(s)
    }
}

/// Convenience for closures running against a `RegisterLink`.
pub fn map_boxed(e: Box<dyn std::error::Error + Send + Sync>) -> ScaleError {
    map_hw_error(e.as_ref())
}
