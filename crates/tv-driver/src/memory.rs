//! In-process [`HomeBus`] for tests and simulation.
//!
//! States are held in a map. Commands are recorded and applied the way the
//! platform would: a TRV setpoint lands in the TRV's `temperature` attribute,
//! a valve position becomes the valve entity's state. A change is broadcast
//! only when a stored state actually changes.

use std::collections::{HashMap, HashSet};
use std::future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::bus::HomeBus;
use crate::entity::{EntityRef, EntityState};
use crate::error::BusError;

const CHANGE_CAPACITY: usize = 256;
const ATTR_TARGET_TEMPERATURE: &str = "temperature";

/// A command received by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusCommand {
    SetTrvTarget { entity: EntityRef, temperature: f64 },
    SetValvePosition { entity: EntityRef, position: u8 },
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<EntityRef, EntityState>,
    commands: Vec<BusCommand>,
    rejecting: HashSet<EntityRef>,
    stalling: HashSet<EntityRef>,
}

#[derive(Debug)]
pub struct MemoryBus {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<EntityRef>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, entity: EntityRef, state: EntityState) {
        let changed = {
            let mut inner = self.lock();
            match inner.states.get(&entity) {
                Some(current) if *current == state => false,
                _ => {
                    inner.states.insert(entity.clone(), state);
                    true
                }
            }
        };
        if changed {
            // no subscribers is fine
            let _ = self.changes.send(entity);
        }
    }

    /// Replace an entity's state, keeping its attributes.
    pub fn set_state(&self, entity: impl Into<EntityRef>, state: impl Into<String>) {
        let entity = entity.into();
        let mut next = self.state(&entity).unwrap_or_default();
        next.state = state.into();
        self.store(entity, next);
    }

    /// Set a numeric sensor state.
    pub fn set_number(&self, entity: impl Into<EntityRef>, value: f64) {
        self.set_state(entity, value.to_string());
    }

    /// Replace an entity's full state.
    pub fn set_entity(&self, entity: impl Into<EntityRef>, state: EntityState) {
        self.store(entity.into(), state);
    }

    /// Set one attribute, creating the entity if needed.
    pub fn set_attribute(
        &self,
        entity: impl Into<EntityRef>,
        key: &str,
        value: impl Into<Value>,
    ) {
        let entity = entity.into();
        let next = self.state(&entity).unwrap_or_default().with_attribute(key, value);
        self.store(entity, next);
    }

    /// Publish a TRV reading. `None` removes the attribute.
    pub fn set_trv(
        &self,
        entity: impl Into<EntityRef>,
        current_temperature: Option<f64>,
        hvac_action: Option<&str>,
    ) {
        let entity = entity.into();
        let mut next = self.state(&entity).unwrap_or_else(|| EntityState::new("heat"));
        match current_temperature {
            Some(t) => {
                next.attributes.insert("current_temperature".into(), t.into());
            }
            None => {
                next.attributes.remove("current_temperature");
            }
        }
        match hvac_action {
            Some(action) => {
                next.attributes.insert("hvac_action".into(), action.into());
            }
            None => {
                next.attributes.remove("hvac_action");
            }
        }
        self.store(entity, next);
    }

    pub fn remove(&self, entity: impl Into<EntityRef>) {
        let entity = entity.into();
        let removed = self.lock().states.remove(&entity).is_some();
        if removed {
            let _ = self.changes.send(entity);
        }
    }

    /// Make commands to `entity` fail (or succeed again).
    pub fn reject_commands(&self, entity: impl Into<EntityRef>, reject: bool) {
        let entity = entity.into();
        let mut inner = self.lock();
        if reject {
            inner.rejecting.insert(entity);
        } else {
            inner.rejecting.remove(&entity);
        }
    }

    /// Make commands to `entity` never complete (or complete again).
    /// A stalled command is still recorded.
    pub fn stall_commands(&self, entity: impl Into<EntityRef>, stall: bool) {
        let entity = entity.into();
        let mut inner = self.lock();
        if stall {
            inner.stalling.insert(entity);
        } else {
            inner.stalling.remove(&entity);
        }
    }

    pub fn state(&self, entity: &EntityRef) -> Option<EntityState> {
        self.lock().states.get(entity).cloned()
    }

    /// Commands received so far, rejected ones included.
    pub fn commands(&self) -> Vec<BusCommand> {
        self.lock().commands.clone()
    }

    pub fn take_commands(&self) -> Vec<BusCommand> {
        std::mem::take(&mut self.lock().commands)
    }

    /// Positions sent to `valve`, oldest first.
    pub fn valve_positions(&self, valve: &EntityRef) -> Vec<u8> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                BusCommand::SetValvePosition { entity, position } if entity == valve => {
                    Some(*position)
                }
                _ => None,
            })
            .collect()
    }

    /// Setpoints sent to `trv`, oldest first.
    pub fn trv_targets(&self, trv: &EntityRef) -> Vec<f64> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                BusCommand::SetTrvTarget { entity, temperature } if entity == trv => {
                    Some(*temperature)
                }
                _ => None,
            })
            .collect()
    }

    /// Record `command` if `entity` is stalled.
    fn stalls(&self, entity: &EntityRef, command: &BusCommand) -> bool {
        let mut inner = self.lock();
        if inner.stalling.contains(entity) {
            inner.commands.push(command.clone());
            true
        } else {
            false
        }
    }

    fn accept(&self, entity: &EntityRef, command: BusCommand) -> Result<(), BusError> {
        let mut inner = self.lock();
        inner.commands.push(command);
        if inner.rejecting.contains(entity) {
            return Err(BusError::Rejected {
                entity: entity.clone(),
                message: "command rejected by device".into(),
            });
        }
        if !inner.states.contains_key(entity) {
            return Err(BusError::Unavailable {
                entity: entity.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HomeBus for MemoryBus {
    async fn entity_state(&self, entity: &EntityRef) -> Option<EntityState> {
        self.state(entity)
    }

    async fn set_trv_target(&self, trv: &EntityRef, temperature: f64) -> Result<(), BusError> {
        let command = BusCommand::SetTrvTarget {
            entity: trv.clone(),
            temperature,
        };
        if self.stalls(trv, &command) {
            return future::pending().await;
        }
        self.accept(trv, command)?;
        self.set_attribute(trv.clone(), ATTR_TARGET_TEMPERATURE, temperature);
        Ok(())
    }

    async fn set_valve_position(&self, valve: &EntityRef, position: u8) -> Result<(), BusError> {
        let command = BusCommand::SetValvePosition {
            entity: valve.clone(),
            position,
        };
        if self.stalls(valve, &command) {
            return future::pending().await;
        }
        self.accept(valve, command)?;
        self.set_state(valve.clone(), position.to_string());
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<EntityRef> {
        self.changes.subscribe()
    }
}
