//! Error types for control operations.

use thiserror::Error;
use tv_core::TvError;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur when building or reconfiguring a controller.
///
/// Updates themselves never fail; only precondition violations at
/// construction or reconfiguration time are reported.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Numeric precondition violated (non-finite or out of bounds).
    #[error(transparent)]
    Numeric(#[from] TvError),
}
