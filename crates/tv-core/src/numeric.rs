use crate::TvError;

/// Floating point type used throughout the system.
pub type Real = f64;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, TvError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(TvError::NonFinite { what, value: v })
    }
}

/// Finite and inside the closed interval `[min, max]`.
pub fn ensure_in_range(v: Real, min: Real, max: Real, what: &'static str) -> Result<Real, TvError> {
    let v = ensure_finite(v, what)?;
    if v < min || v > max {
        return Err(TvError::OutOfRange {
            what,
            value: v,
            min,
            max,
        });
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "p_gain").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
        assert!(msg.contains("p_gain"));
    }

    #[test]
    fn ensure_in_range_is_inclusive() {
        assert_eq!(ensure_in_range(0.0, 0.0, 5.0, "gain"), Ok(0.0));
        assert_eq!(ensure_in_range(5.0, 0.0, 5.0, "gain"), Ok(5.0));
        assert!(matches!(
            ensure_in_range(5.01, 0.0, 5.0, "gain"),
            Err(TvError::OutOfRange { .. })
        ));
        assert!(matches!(
            ensure_in_range(-0.01, 0.0, 5.0, "gain"),
            Err(TvError::OutOfRange { .. })
        ));
        assert!(matches!(
            ensure_in_range(Real::INFINITY, 0.0, 5.0, "gain"),
            Err(TvError::NonFinite { .. })
        ));
    }
}
