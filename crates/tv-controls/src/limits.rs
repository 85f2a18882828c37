//! Fixed bounds and defaults of the control law.

/// Proportional gain bounds, valve-% per degree of error.
pub const MIN_P_GAIN: f64 = 0.0;
pub const MAX_P_GAIN: f64 = 50.0;
pub const DEFAULT_P_GAIN: f64 = 10.0;

/// Integral gain bounds, valve-% per degree-minute.
pub const MIN_I_GAIN: f64 = 0.0;
pub const MAX_I_GAIN: f64 = 5.0;
pub const DEFAULT_I_GAIN: f64 = 0.5;

/// Back-calculation gain. Not user tunable.
pub const ANTI_WINDUP_GAIN: f64 = 1.0;

/// Valve position command range (percent).
pub const MIN_VALVE_POSITION: f64 = 0.0;
pub const MAX_VALVE_POSITION: f64 = 100.0;

/// Position commanded while the TRV reports no heat demand.
pub const FAIL_OPEN_POSITION: u8 = 100;

/// Safe setpoint range accepted by the TRV (°C).
pub const MIN_TRV_TARGET_TEMP: f64 = 5.0;
pub const MAX_TRV_TARGET_TEMP: f64 = 25.0;

/// Substituted for a non-positive elapsed time.
pub const FALLBACK_ELAPSED_S: f64 = 1.0;

/// Default period of the valve maintenance timer.
pub const VALVE_UPDATE_INTERVAL_S: f64 = 60.0;
