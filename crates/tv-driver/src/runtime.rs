//! Task that serves one [`DeviceLoop`].
//!
//! The task owns the loop and waits on three sources:
//! - commands from the [`DeviceHandle`]
//! - entity change notifications from the bus (full cycle)
//! - the valve maintenance timer (valve-only cycle), only when a valve is configured
//!
//! Each wake runs to completion before the next source is polled, so cycles of
//! one device are strictly sequential.

use std::future;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tv_controls::{ControlResult, GainUpdate};

use crate::device::DeviceLoop;
use crate::entity::EntityRef;
use crate::diagnostics::PublishedDiagnostics;
use crate::error::{DriverError, DriverResult};

/// Shortest maintenance period; tokio rejects a zero period.
const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Commands accepted by a running device.
#[derive(Debug)]
pub enum DeviceCommand {
    /// Apply new gains and report whether they were accepted.
    Reconfigure {
        update: GainUpdate,
        reply: oneshot::Sender<ControlResult<()>>,
    },
    /// Run a full cycle now.
    Refresh,
    /// Stop the task after the current cycle.
    Shutdown,
}

/// Spawns device tasks.
pub struct DeviceRuntime;

impl DeviceRuntime {
    /// Start serving `device` on the current tokio runtime.
    ///
    /// A full cycle runs immediately; afterwards the task only wakes on
    /// triggers. Must be called from within a tokio runtime.
    pub fn spawn(device: DeviceLoop) -> DeviceHandle {
        let id = device.settings().id.clone();
        let diagnostics = device.diagnostics().subscribe();
        // subscribe before returning so no change after spawn is missed
        let changes = device.bus().subscribe_changes();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(device, command_rx, changes));

        DeviceHandle {
            id,
            commands: command_tx,
            diagnostics,
            task: Some(task),
        }
    }
}

async fn run(
    mut device: DeviceLoop,
    mut commands: mpsc::UnboundedReceiver<DeviceCommand>,
    mut changes: broadcast::Receiver<EntityRef>,
) -> DeviceLoop {
    let id = device.settings().id.clone();
    let mut timer = device.settings().valve.as_ref().map(|_| {
        let period = device.settings().valve_interval.max(MIN_TIMER_PERIOD);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    info!(
        device = %id,
        valve = timer.is_some(),
        "device started"
    );

    device.full_cycle().await;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(DeviceCommand::Reconfigure { update, reply }) => {
                    let result = device.reconfigure(update);
                    if let Err(err) = &result {
                        warn!(device = %id, error = %err, "rejected gain update");
                    }
                    // the caller may have gone away
                    let _ = reply.send(result);
                }
                Some(DeviceCommand::Refresh) => {
                    device.full_cycle().await;
                }
                Some(DeviceCommand::Shutdown) | None => break,
            },

            change = changes.recv() => match change {
                Ok(entity) => {
                    if device.settings().is_watched(&entity) {
                        debug!(device = %id, entity = %entity, "watched entity changed");
                        device.full_cycle().await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // values are re-read anyway, one cycle covers all of them
                    debug!(device = %id, skipped, "change notifications lagged");
                    device.full_cycle().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!(device = %id, "bus closed change notifications");
                    break;
                }
            },

            _ = tick(&mut timer) => {
                device.valve_cycle().await;
            }
        }
    }

    // unregister triggers before handing the state back
    drop(timer);
    drop(changes);
    device.flush().await;
    info!(device = %id, "device stopped");
    device
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

/// Handle to a running device task.
#[derive(Debug)]
pub struct DeviceHandle {
    id: String,
    commands: mpsc::UnboundedSender<DeviceCommand>,
    diagnostics: watch::Receiver<PublishedDiagnostics>,
    task: Option<JoinHandle<DeviceLoop>>,
}

impl DeviceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Receiver for the diagnostics record; any number may be cloned from it.
    pub fn diagnostics(&self) -> watch::Receiver<PublishedDiagnostics> {
        self.diagnostics.clone()
    }

    /// Latest published record.
    pub fn current_diagnostics(&self) -> PublishedDiagnostics {
        self.diagnostics.borrow().clone()
    }

    fn send(&self, command: DeviceCommand) -> DriverResult<()> {
        self.commands.send(command).map_err(|_| DriverError::Stopped {
            id: self.id.clone(),
        })
    }

    /// Apply new gains between cycles.
    ///
    /// # Errors
    ///
    /// Returns error if a gain is out of bounds, the update is empty, or the
    /// device has stopped.
    pub async fn reconfigure(&self, update: GainUpdate) -> DriverResult<()> {
        let (reply, response) = oneshot::channel();
        self.send(DeviceCommand::Reconfigure { update, reply })?;
        let result = response.await.map_err(|_| DriverError::Stopped {
            id: self.id.clone(),
        })?;
        Ok(result?)
    }

    /// Request a full cycle.
    pub fn refresh(&self) -> DriverResult<()> {
        self.send(DeviceCommand::Refresh)
    }

    /// Stop the device and wait for its task.
    ///
    /// A cycle already running completes first. Returns the device with its
    /// final controller state.
    pub async fn shutdown(mut self) -> DriverResult<DeviceLoop> {
        // a closed channel means the task is already on its way out
        let _ = self.commands.send(DeviceCommand::Shutdown);
        let Some(task) = self.task.take() else {
            return Err(DriverError::Stopped { id: self.id });
        };
        task.await.map_err(|err| DriverError::Task {
            id: self.id.clone(),
            message: err.to_string(),
        })
    }
}
