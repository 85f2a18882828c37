use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Config error: {0}")]
    Project(#[from] tv_project::ProjectError),

    #[error("Driver error: {0}")]
    Driver(#[from] tv_driver::DriverError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Device '{id}' not found in config")]
    UnknownDevice { id: String },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },
}

pub type CliResult<T> = Result<T, CliError>;
