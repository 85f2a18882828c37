//! Error types for the loop driver.

use thiserror::Error;
use tv_controls::ControlError;

use crate::entity::EntityRef;

/// Failure of a single actuator command on the bus.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BusError {
    #[error("Command to {entity} rejected: {message}")]
    Rejected { entity: EntityRef, message: String },

    #[error("Entity {entity} is not available")]
    Unavailable { entity: EntityRef },

    #[error("Command to {entity} timed out")]
    Timeout { entity: EntityRef },
}

/// Errors surfaced to callers of the driver.
///
/// Missing readings, actuator failures and clock anomalies are handled inside
/// a cycle and never show up here.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Controller error: {0}")]
    Control(#[from] ControlError),

    #[error("Device '{id}' not found")]
    UnknownDevice { id: String },

    #[error("Device '{id}' has stopped")]
    Stopped { id: String },

    #[error("Device '{id}' task failed: {message}")]
    Task { id: String, message: String },

    #[error("Invalid device settings: {what}")]
    InvalidSettings { what: String },
}

pub type DriverResult<T> = Result<T, DriverError>;
