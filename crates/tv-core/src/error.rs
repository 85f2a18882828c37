use thiserror::Error;

pub type TvResult<T> = Result<T, TvError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TvError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Value out of range for {what}: {value} (expected {min}..={max})")]
    OutOfRange {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}
