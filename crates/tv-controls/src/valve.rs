//! PI valve controller with back-calculation anti-windup.
//!
//! The controller maps the room error (`target - reference`) and the time since
//! its previous update to an integer valve position in `[0, 100]`.
//!
//! Per update:
//! - `p = p_gain * error`
//! - `i = i_gain * integrator` (the integrator holds degree-minutes; the gain is
//!   applied when read)
//! - `desired = p + i`, `actual = clamp(desired, 0, 100)`
//! - saturated: `integrator -= (desired - actual) * anti_windup_gain * minutes`
//! - otherwise: `integrator += error * minutes`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tv_core::{as_minutes, ensure_in_range, s};

use crate::error::{ControlError, ControlResult};
use crate::limits::{
    ANTI_WINDUP_GAIN, DEFAULT_I_GAIN, DEFAULT_P_GAIN, FALLBACK_ELAPSED_S, MAX_I_GAIN, MAX_P_GAIN,
    MAX_VALVE_POSITION, MIN_I_GAIN, MIN_P_GAIN, MIN_VALVE_POSITION,
};

/// Gains of one valve controller.
///
/// Gains are validated on every write; the anti-windup gain and output
/// bounds are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    p_gain: f64,
    i_gain: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            p_gain: DEFAULT_P_GAIN,
            i_gain: DEFAULT_I_GAIN,
        }
    }
}

impl ControllerConfig {
    /// Create a configuration.
    ///
    /// # Errors
    ///
    /// Returns error if `p_gain` is outside `[0, 50]`, `i_gain` is outside
    /// `[0, 5]`, or either is not finite.
    pub fn new(p_gain: f64, i_gain: f64) -> ControlResult<Self> {
        Ok(Self {
            p_gain: check_p_gain(p_gain)?,
            i_gain: check_i_gain(i_gain)?,
        })
    }

    pub fn p_gain(&self) -> f64 {
        self.p_gain
    }

    pub fn i_gain(&self) -> f64 {
        self.i_gain
    }

    pub fn anti_windup_gain(&self) -> f64 {
        ANTI_WINDUP_GAIN
    }

    pub fn set_p_gain(&mut self, p_gain: f64) -> ControlResult<()> {
        self.p_gain = check_p_gain(p_gain)?;
        Ok(())
    }

    pub fn set_i_gain(&mut self, i_gain: f64) -> ControlResult<()> {
        self.i_gain = check_i_gain(i_gain)?;
        Ok(())
    }

    /// Apply a partial gain update. Nothing is written unless every provided
    /// gain is valid.
    pub fn apply(&mut self, update: GainUpdate) -> ControlResult<()> {
        if update.is_empty() {
            return Err(ControlError::InvalidArg {
                what: "gain update must set p_gain or i_gain",
            });
        }
        let p_gain = update.p_gain.map(check_p_gain).transpose()?;
        let i_gain = update.i_gain.map(check_i_gain).transpose()?;
        if let Some(p) = p_gain {
            self.p_gain = p;
        }
        if let Some(i) = i_gain {
            self.i_gain = i;
        }
        Ok(())
    }
}

fn check_p_gain(p_gain: f64) -> ControlResult<f64> {
    Ok(ensure_in_range(p_gain, MIN_P_GAIN, MAX_P_GAIN, "p_gain")?)
}

fn check_i_gain(i_gain: f64) -> ControlResult<f64> {
    Ok(ensure_in_range(i_gain, MIN_I_GAIN, MAX_I_GAIN, "i_gain")?)
}

/// Reconfiguration request; each gain is independently optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GainUpdate {
    pub p_gain: Option<f64>,
    pub i_gain: Option<f64>,
}

impl GainUpdate {
    pub fn p_gain(p_gain: f64) -> Self {
        Self {
            p_gain: Some(p_gain),
            i_gain: None,
        }
    }

    pub fn i_gain(i_gain: f64) -> Self {
        Self {
            p_gain: None,
            i_gain: Some(i_gain),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.p_gain.is_none() && self.i_gain.is_none()
    }
}

/// Mutable state of one valve controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    /// Accumulated degree-minutes.
    pub integrator: f64,
    /// Wall-clock time of the previous update, absent until the first one.
    pub last_update: Option<DateTime<Utc>>,
    /// Most recent error, for diagnostics only.
    pub last_error: f64,
}

/// Breakdown of a single update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiStep {
    pub p_term: f64,
    pub i_term: f64,
    pub desired: f64,
    pub actual: f64,
    pub saturated: bool,
    pub elapsed_minutes: f64,
    /// Rounded `actual`, the value sent to the valve.
    pub position: u8,
}

/// Seconds between `last` and `now`, or the fallback when there is no
/// previous update.
///
/// Wall-clock deltas may be zero or negative after a clock adjustment; those
/// are passed through and handled by [`ValveController::update`].
pub fn elapsed_seconds(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last {
        Some(last) => {
            let delta = now - last;
            match delta.num_microseconds() {
                Some(us) => us as f64 / 1.0e6,
                // beyond ~292k years the microsecond count overflows
                None => delta.num_milliseconds() as f64 / 1000.0,
            }
        }
        None => FALLBACK_ELAPSED_S,
    }
}

/// Stateful PI controller for one auxiliary valve.
#[derive(Debug, Clone, Default)]
pub struct ValveController {
    config: ControllerConfig,
    state: ControllerState,
}

impl ValveController {
    /// Create a controller with a zeroed integrator.
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            state: ControllerState::default(),
        }
    }

    /// Create a controller from raw gains.
    ///
    /// # Errors
    ///
    /// Returns error if either gain is out of bounds.
    pub fn with_gains(p_gain: f64, i_gain: f64) -> ControlResult<Self> {
        Ok(Self::new(ControllerConfig::new(p_gain, i_gain)?))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn integrator(&self) -> f64 {
        self.state.integrator
    }

    /// Change gains without resetting the integrator or timestamp.
    pub fn reconfigure(&mut self, update: GainUpdate) -> ControlResult<()> {
        self.config.apply(update)?;
        debug!(
            p_gain = self.config.p_gain,
            i_gain = self.config.i_gain,
            "updated valve controller gains"
        );
        Ok(())
    }

    /// Advance the controller by `elapsed_seconds` and return the valve position.
    ///
    /// A non-positive (or non-finite) `elapsed_seconds` is replaced by one second.
    pub fn update(&mut self, error: f64, elapsed_seconds: f64) -> u8 {
        self.step(error, elapsed_seconds).position
    }

    /// Same as [`update`](Self::update), returning the intermediate terms.
    pub fn step(&mut self, error: f64, elapsed_seconds: f64) -> PiStep {
        let elapsed_seconds = if elapsed_seconds > 0.0 && elapsed_seconds.is_finite() {
            elapsed_seconds
        } else {
            FALLBACK_ELAPSED_S
        };
        let elapsed_minutes = as_minutes(s(elapsed_seconds));

        let p_term = self.config.p_gain * error;
        let i_term = self.config.i_gain * self.state.integrator;
        let desired = p_term + i_term;
        // a NaN output (infinite error against a zero gain) opens the valve
        let actual = if desired.is_nan() {
            MAX_VALVE_POSITION
        } else {
            desired.clamp(MIN_VALVE_POSITION, MAX_VALVE_POSITION)
        };
        let saturated = desired != actual;

        let integrator = if saturated {
            let excess = desired - actual;
            debug!(desired, actual, excess, "anti-windup active");
            self.state.integrator - excess * ANTI_WINDUP_GAIN * elapsed_minutes
        } else {
            self.state.integrator + error * elapsed_minutes
        };
        if integrator.is_finite() {
            self.state.integrator = integrator;
        } else {
            warn!(
                error,
                desired,
                integrator = self.state.integrator,
                "non-finite controller update, integrator kept"
            );
        }
        self.state.last_error = error;

        let position = actual.round() as u8;
        debug!(
            error,
            elapsed_seconds,
            p_term,
            i_term,
            position,
            integrator = self.state.integrator,
            "PI controller update"
        );

        PiStep {
            p_term,
            i_term,
            desired,
            actual,
            saturated,
            elapsed_minutes,
            position,
        }
    }

    /// Update using wall-clock time: elapsed time is measured from the previous
    /// timestamped update (one second if there is none), and `now` becomes the
    /// new timestamp.
    pub fn update_at(&mut self, error: f64, now: DateTime<Utc>) -> PiStep {
        let elapsed = elapsed_seconds(self.state.last_update, now);
        self.state.last_update = Some(now);
        self.step(error, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap()
    }

    #[test]
    fn controller_creation() {
        let c = ValveController::with_gains(10.0, 0.5).unwrap();
        assert_eq!(c.config().p_gain(), 10.0);
        assert_eq!(c.config().i_gain(), 0.5);
        assert_eq!(c.config().anti_windup_gain(), 1.0);
        assert_eq!(c.integrator(), 0.0);
        assert!(c.state().last_update.is_none());
    }

    #[test]
    fn invalid_gains_fail_at_construction() {
        assert!(ValveController::with_gains(-0.1, 0.5).is_err());
        assert!(ValveController::with_gains(50.1, 0.5).is_err());
        assert!(ValveController::with_gains(10.0, 5.5).is_err());
        assert!(ValveController::with_gains(f64::NAN, 0.5).is_err());
        assert!(ValveController::with_gains(0.0, 0.0).is_ok());
        assert!(ValveController::with_gains(50.0, 5.0).is_ok());
    }

    #[test]
    fn unsaturated_step_integrates_in_minutes() {
        let mut c = ValveController::with_gains(10.0, 0.5).unwrap();
        let step = c.step(3.0, 60.0);
        assert_eq!(step.p_term, 30.0);
        assert_eq!(step.i_term, 0.0);
        assert_eq!(step.position, 30);
        assert!(!step.saturated);
        assert!((c.integrator() - 3.0).abs() < 1e-12);
        assert_eq!(c.state().last_error, 3.0);

        // integrator now contributes: 30 + 0.5 * 3 = 31.5 -> 32
        assert_eq!(c.update(3.0, 60.0), 32);
        assert!((c.integrator() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn saturated_high_unwinds_integrator() {
        let mut c = ValveController::with_gains(10.0, 0.5).unwrap();
        // desired = 150 -> excess 50, one minute
        let step = c.step(15.0, 60.0);
        assert!(step.saturated);
        assert_eq!(step.position, 100);
        assert!((c.integrator() + 50.0).abs() < 1e-12);
    }

    #[test]
    fn saturated_low_raises_integrator() {
        let mut c = ValveController::with_gains(10.0, 0.5).unwrap();
        // desired = -20 -> excess -20, half a minute
        let step = c.step(-2.0, 30.0);
        assert!(step.saturated);
        assert_eq!(step.position, 0);
        assert!((c.integrator() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn non_positive_elapsed_falls_back_to_one_second() {
        for elapsed in [0.0, -5.0, f64::NAN] {
            let mut c = ValveController::with_gains(10.0, 0.5).unwrap();
            let step = c.step(3.0, elapsed);
            assert!((step.elapsed_minutes - 1.0 / 60.0).abs() < 1e-12);
            assert!((c.integrator() - 3.0 / 60.0).abs() < 1e-12);
        }
    }

    #[test]
    fn update_at_tracks_wall_clock() {
        let mut c = ValveController::with_gains(10.0, 0.5).unwrap();

        let first = c.update_at(3.0, t0());
        assert!((first.elapsed_minutes - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(c.state().last_update, Some(t0()));

        let second = c.update_at(3.0, t0() + Duration::seconds(120));
        assert!((second.elapsed_minutes - 2.0).abs() < 1e-12);

        // clock stepped backwards: fallback, timestamp still replaced
        let earlier = t0() + Duration::seconds(30);
        let third = c.update_at(3.0, earlier);
        assert!((third.elapsed_minutes - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(c.state().last_update, Some(earlier));
    }

    #[test]
    fn reconfigure_keeps_state() {
        let mut c = ValveController::with_gains(10.0, 0.5).unwrap();
        c.update_at(3.0, t0());
        let integrator = c.integrator();

        c.reconfigure(GainUpdate::p_gain(20.0)).unwrap();
        assert_eq!(c.config().p_gain(), 20.0);
        assert_eq!(c.config().i_gain(), 0.5);
        assert_eq!(c.integrator(), integrator);
        assert_eq!(c.state().last_update, Some(t0()));

        c.reconfigure(GainUpdate::i_gain(1.5)).unwrap();
        assert_eq!(c.config().i_gain(), 1.5);
    }

    #[test]
    fn rejected_reconfigure_changes_nothing() {
        let mut c = ValveController::with_gains(10.0, 0.5).unwrap();
        let update = GainUpdate {
            p_gain: Some(12.0),
            i_gain: Some(9.0),
        };
        assert!(c.reconfigure(update).is_err());
        assert_eq!(c.config().p_gain(), 10.0);
        assert!(c.reconfigure(GainUpdate::default()).is_err());
    }

    #[test]
    fn sub_millisecond_elapsed_is_kept() {
        let elapsed = elapsed_seconds(Some(t0()), t0() + Duration::microseconds(500));
        assert!((elapsed - 0.0005).abs() < 1e-12);

        let mut c = ValveController::with_gains(10.0, 0.5).unwrap();
        c.update_at(3.0, t0());
        let before = c.integrator();
        let step = c.update_at(3.0, t0() + Duration::microseconds(500));
        assert!((step.elapsed_minutes - 0.0005 / 60.0).abs() < 1e-15);
        assert!((c.integrator() - before - 3.0 * 0.0005 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn overflowing_error_keeps_integrator_finite() {
        let mut c = ValveController::with_gains(50.0, 0.5).unwrap();
        assert_eq!(c.update(1e307, 60.0), 100);
        assert_eq!(c.integrator(), 0.0);

        // normal control resumes afterwards
        let outputs: Vec<u8> = (0..5).map(|_| c.update(1.0, 60.0)).collect();
        assert_eq!(outputs[0], 50);
        assert!(outputs.iter().all(|&p| p > 0));
        assert!(c.integrator().is_finite());
    }

    #[test]
    fn nan_desired_output_opens_valve() {
        // p_gain 0 times an infinite error
        let mut c = ValveController::with_gains(0.0, 0.5).unwrap();
        let step = c.step(f64::INFINITY, 60.0);
        assert_eq!(step.position, 100);
        assert_eq!(c.integrator(), 0.0);
    }

    #[test]
    fn elapsed_without_previous_update_is_fallback() {
        assert_eq!(elapsed_seconds(None, t0()), 1.0);
        assert_eq!(
            elapsed_seconds(Some(t0()), t0() + Duration::milliseconds(1500)),
            1.5
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn output_always_within_valve_range(
            p_gain in 0.0f64..=50.0,
            i_gain in 0.0f64..=5.0,
            steps in prop::collection::vec((-1.0e3f64..1.0e3, 0.001f64..7200.0), 1..200),
        ) {
            let mut c = ValveController::with_gains(p_gain, i_gain).unwrap();
            for (error, elapsed) in steps {
                let out = c.update(error, elapsed);
                prop_assert!(out <= 100, "output {out} out of bounds");
            }
        }
    }
}
