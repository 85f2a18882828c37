//! Setpoint compensation for the TRV's built-in sensor.
//!
//! The TRV sits on the radiator, so its own sensor reads warmer than the room.
//! Adding that bias to the desired room temperature gives the local setpoint
//! that makes the *room* settle at the target.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::limits::{MAX_TRV_TARGET_TEMP, MIN_TRV_TARGET_TEMP};

/// Result of one compensation, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    /// `trv_local - reference`
    pub offset: f64,
    /// `target + offset`, before clamping.
    pub unclamped: f64,
    /// Setpoint to command on the TRV.
    pub adjusted_target: f64,
}

impl Compensation {
    /// Shift applied to the user target, after clamping.
    pub fn adjustment(&self, target: f64) -> f64 {
        self.adjusted_target - target
    }

    pub fn was_clamped(&self) -> bool {
        self.adjusted_target != self.unclamped
    }
}

/// Compute the compensated TRV setpoint.
///
/// Callers must have rejected missing readings already. The result is always
/// clamped to `[MIN_TRV_TARGET_TEMP, MAX_TRV_TARGET_TEMP]`; clamping is not an
/// error.
pub fn compensate(target: f64, reference: f64, trv_local: f64) -> Compensation {
    let offset = trv_local - reference;
    let unclamped = target + offset;
    let adjusted_target = unclamped.clamp(MIN_TRV_TARGET_TEMP, MAX_TRV_TARGET_TEMP);

    debug!(
        target,
        reference,
        trv_local,
        offset,
        adjusted_target,
        "temperature compensation"
    );

    Compensation {
        offset,
        unclamped,
        adjusted_target,
    }
}

/// Shorthand for [`compensate`] returning only the setpoint.
pub fn adjust(target: f64, reference: f64, trv_local: f64) -> f64 {
    compensate(target, reference, trv_local).adjusted_target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_trv_bias_to_target() {
        let c = compensate(20.0, 19.0, 22.0);
        assert!((c.offset - 3.0).abs() < 1e-12);
        assert!((c.adjusted_target - 23.0).abs() < 1e-12);
        assert!(!c.was_clamped());
        assert!((c.adjustment(20.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn clamps_to_upper_bound() {
        // 21 + (25 - 18) = 28 -> 25
        let c = compensate(21.0, 18.0, 25.0);
        assert_eq!(c.adjusted_target, 25.0);
        assert_eq!(c.unclamped, 28.0);
        assert!(c.was_clamped());
        assert_eq!(c.adjustment(21.0), 4.0);
    }

    #[test]
    fn clamps_to_lower_bound() {
        // TRV reading colder than the room, low target
        assert_eq!(adjust(6.0, 20.0, 15.0), MIN_TRV_TARGET_TEMP);
    }

    #[test]
    fn negative_bias_lowers_setpoint() {
        assert!((adjust(20.0, 21.0, 19.5) - 18.5).abs() < 1e-12);
    }
}
