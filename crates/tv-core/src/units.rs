use uom::si::f64::Time as UomTime;

pub type Time = UomTime;

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

/// Integral gains are expressed per degree-minute, so elapsed time is fed to
/// the integrator in minutes.
#[inline]
pub fn as_minutes(t: Time) -> f64 {
    use uom::si::time::minute;
    t.get::<minute>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_to_minutes() {
        assert!((as_minutes(s(60.0)) - 1.0).abs() < 1e-12);
        assert!((as_minutes(s(90.0)) - 1.5).abs() < 1e-12);
        assert!((as_minutes(s(1.0)) - 1.0 / 60.0).abs() < 1e-12);
    }
}
