//! Inverse-time overcurrent relay model.
//!
//! Operating time follows the standard IEC/IEEE curve
//! `t = tds * (A / (M^p - 1) + B)` where `M` is the multiple of pickup. The
//! constants default to the IEC standard inverse characteristic
//! (A = 0.14, B = 0, p = 0.02).

use crate::config::CurveConfig;
use thiserror::Error;

/// Operating time reported when the relay never picks up (`M <= 1`).
///
/// A large finite value rather than `f64::INFINITY`: downstream code subtracts
/// and sums operating times, and those results must stay comparable. Any
/// computed time is also clamped to this ceiling.
pub const NO_OPERATION_TIME: f64 = 100.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Computes the relay operating time in seconds for a given fault current.
///
/// # Arguments
/// * `fault_current` - Fault current seen by the relay, in amperes (must be > 0)
/// * `pickup` - Pickup current setting, in amperes (must be > 0)
/// * `tds` - Time-dial setting; out-of-bound values are the caller's problem
///   (the engine repairs genes before evaluation), they never error here
/// * `curve` - Curve constants
///
/// # Returns
/// * `Ok(time)` - Operating time, clamped to `[0, NO_OPERATION_TIME]`.
///   When the fault current does not exceed pickup the relay does not see the
///   fault, and the result is exactly [`NO_OPERATION_TIME`].
/// * `Err(CurveError::InvalidInput)` - Non-physical current or pickup.
pub fn operating_time(
    fault_current: f64,
    pickup: f64,
    tds: f64,
    curve: &CurveConfig,
) -> Result<f64, CurveError> {
    if !fault_current.is_finite() || fault_current <= 0.0 {
        return Err(CurveError::InvalidInput(format!(
            "fault current must be positive, got {}",
            fault_current
        )));
    }
    if !pickup.is_finite() || pickup <= 0.0 {
        return Err(CurveError::InvalidInput(format!(
            "pickup must be positive, got {}",
            pickup
        )));
    }

    let m = fault_current / pickup;
    if m <= 1.0 {
        return Ok(NO_OPERATION_TIME);
    }

    let denom = m.powf(curve.p) - 1.0;
    if denom <= 0.0 {
        // Only reachable through rounding when M is barely above 1.
        return Ok(NO_OPERATION_TIME);
    }

    let time = tds * (curve.a / denom + curve.b);
    Ok(time.clamp(0.0, NO_OPERATION_TIME))
}
