//! Boundary to the hosting home-automation platform.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::entity::{EntityRef, EntityState};
use crate::error::BusError;

/// Reads entity states, sends actuator commands and announces state changes.
///
/// Implementations must be shareable across device tasks. Commands resolve
/// once the platform has accepted or rejected them.
#[async_trait]
pub trait HomeBus: Send + Sync {
    /// Current state of `entity`, or `None` if it does not exist.
    async fn entity_state(&self, entity: &EntityRef) -> Option<EntityState>;

    /// Set the TRV's own target temperature.
    async fn set_trv_target(&self, trv: &EntityRef, temperature: f64) -> Result<(), BusError>;

    /// Set the auxiliary valve position, in percent.
    async fn set_valve_position(&self, valve: &EntityRef, position: u8) -> Result<(), BusError>;

    /// Stream of entities whose state changed.
    fn subscribe_changes(&self) -> broadcast::Receiver<EntityRef>;
}
