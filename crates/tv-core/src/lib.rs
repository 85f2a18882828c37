//! tv-core: shared foundation for thermovalve.
//!
//! Contains:
//! - units (uom time type and the seconds/minutes conversions of the integrator)
//! - numeric (finite/range checks used to validate gains)
//! - error (shared error type)

pub mod error;
pub mod numeric;
pub mod units;

pub use error::{TvError, TvResult};
pub use numeric::*;
pub use units::*;
