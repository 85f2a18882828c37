//! All devices of one project, each served by its own task.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};
use tv_controls::GainUpdate;
use tv_project::Project;

use crate::bus::HomeBus;
use crate::clock::Clock;
use crate::device::DeviceLoop;
use crate::error::{DriverError, DriverResult};
use crate::runtime::{DeviceHandle, DeviceRuntime};

/// Running devices keyed by id.
#[derive(Debug, Default)]
pub struct Fleet {
    devices: BTreeMap<String, DeviceHandle>,
}

impl Fleet {
    /// Start one device per project entry.
    ///
    /// Every device is built before any is started, so a bad entry starts nothing.
    pub fn start(
        project: &Project,
        bus: Arc<dyn HomeBus>,
        clock: Arc<dyn Clock>,
    ) -> DriverResult<Self> {
        let mut loops = Vec::with_capacity(project.devices.len());
        for def in &project.devices {
            loops.push(DeviceLoop::from_def(
                def,
                project.valve_interval_s,
                Arc::clone(&bus),
                Arc::clone(&clock),
            )?);
        }

        let devices = loops
            .into_iter()
            .map(|device| {
                let handle = DeviceRuntime::spawn(device);
                (handle.id().to_string(), handle)
            })
            .collect::<BTreeMap<_, _>>();
        info!(project = %project.name, devices = devices.len(), "fleet started");
        Ok(Self { devices })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceHandle> {
        self.devices.get(id)
    }

    fn require(&self, id: &str) -> DriverResult<&DeviceHandle> {
        self.device(id).ok_or_else(|| DriverError::UnknownDevice { id: id.to_string() })
    }

    pub async fn reconfigure(&self, id: &str, update: GainUpdate) -> DriverResult<()> {
        self.require(id)?.reconfigure(update).await
    }

    pub fn refresh(&self, id: &str) -> DriverResult<()> {
        self.require(id)?.refresh()
    }

    /// Stop one device and remove it from the fleet.
    pub async fn remove(&mut self, id: &str) -> DriverResult<DeviceLoop> {
        let handle = self
            .devices
            .remove(id)
            .ok_or_else(|| DriverError::UnknownDevice { id: id.to_string() })?;
        handle.shutdown().await
    }

    /// Stop every device. All are stopped even if some fail; the first
    /// failure is returned.
    pub async fn shutdown(self) -> DriverResult<Vec<DeviceLoop>> {
        let mut stopped = Vec::with_capacity(self.devices.len());
        let mut first_error = None;
        for (id, handle) in self.devices {
            match handle.shutdown().await {
                Ok(device) => stopped.push(device),
                Err(err) => {
                    warn!(device = %id, error = %err, "device did not stop cleanly");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(stopped),
        }
    }
}
