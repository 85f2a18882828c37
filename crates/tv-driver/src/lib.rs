//! Loop driver for thermovalve.
//!
//! Decides *when* the compensator and valve controller run for one managed
//! radiator, what to do when readings are missing, and applies the idle
//! fail-open policy.
//!
//! # Architecture
//!
//! - [`bus::HomeBus`] is the boundary to the hosting platform: entity reads,
//!   actuator commands and change notifications.
//! - [`device::DeviceLoop`] owns one controller and runs full and valve-only
//!   cycles against the bus.
//! - [`runtime::DeviceRuntime`] serves one `DeviceLoop` from a single tokio task,
//!   so cycles of a device never overlap.
//! - [`fleet::Fleet`] starts one runtime per configured device.
//! - [`memory::MemoryBus`] is an in-process bus for tests and simulation.

pub mod bus;
pub mod clock;
pub mod device;
pub mod diagnostics;
pub mod entity;
pub mod error;
pub mod fleet;
pub mod memory;
pub mod readings;
pub mod runtime;

pub use bus::HomeBus;
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{
    CycleOutcome, DEFAULT_COMMAND_TIMEOUT, DeviceLoop, DeviceSettings, LoopPhase, ValveAction,
};
pub use diagnostics::{CycleKind, DiagnosticsPublisher, PublishedDiagnostics};
pub use entity::{EntityRef, EntityState};
pub use error::{BusError, DriverError, DriverResult};
pub use fleet::Fleet;
pub use memory::{BusCommand, MemoryBus};
pub use readings::{HvacAction, ObservedSample, TrvReading};
pub use runtime::{DeviceHandle, DeviceRuntime};
