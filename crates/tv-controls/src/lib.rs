//! Temperature compensation and valve control for thermovalve.
//!
//! Two pieces make up the control law of one managed radiator:
//!
//! - [`compensator`]: a pure transform that corrects the TRV's own (radiator-biased)
//!   sensor by shifting the commanded setpoint, clamped to a safe TRV range.
//! - [`valve`]: a stateful PI controller with back-calculation anti-windup that
//!   drives an auxiliary valve between 0 and 100 %.
//!
//! Neither piece schedules anything; the loop driver in `tv-driver` decides when
//! they run.

pub mod compensator;
pub mod error;
pub mod limits;
pub mod valve;

pub use compensator::{Compensation, adjust, compensate};
pub use error::{ControlError, ControlResult};
pub use valve::{ControllerConfig, ControllerState, GainUpdate, PiStep, ValveController, elapsed_seconds};
