//! One managed radiator: readings in, TRV setpoint and valve position out.
//!
//! A [`DeviceLoop`] is the only owner of its [`ValveController`]. Its cycle
//! methods take `&mut self`, so two cycles of the same device cannot run at
//! once; [`crate::runtime`] drives it from a single task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use tv_controls::limits::{FAIL_OPEN_POSITION, VALVE_UPDATE_INTERVAL_S};
use tv_controls::{
    Compensation, ControlResult, ControllerConfig, GainUpdate, PiStep, ValveController, compensate,
};
use tv_project::DeviceDef;

use crate::bus::HomeBus;
use crate::clock::Clock;
use crate::diagnostics::{CycleKind, DiagnosticsPublisher, PublishedDiagnostics};
use crate::entity::EntityRef;
use crate::error::{BusError, DriverError, DriverResult};
use crate::readings::{ObservedSample, TrvReading, read_numeric, read_trv};

/// Attempts logged at info level before missing readings escalate to warnings.
pub const STARTUP_QUIET_ATTEMPTS: u32 = 10;

/// Longest wait for the bus to acknowledge an actuator command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Entities and cadence of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub id: String,
    pub name: String,
    pub trv: EntityRef,
    pub reference: EntityRef,
    pub target: EntityRef,
    /// Without a valve only the compensation path runs.
    pub valve: Option<EntityRef>,
    pub valve_interval: Duration,
    pub command_timeout: Duration,
}

impl DeviceSettings {
    pub fn new(
        id: impl Into<String>,
        trv: impl Into<EntityRef>,
        reference: impl Into<EntityRef>,
        target: impl Into<EntityRef>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            trv: trv.into(),
            reference: reference.into(),
            target: target.into(),
            valve: None,
            valve_interval: Duration::from_secs_f64(VALVE_UPDATE_INTERVAL_S),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_valve(mut self, valve: impl Into<EntityRef>) -> Self {
        self.valve = Some(valve.into());
        self
    }

    pub fn with_valve_interval(mut self, interval: Duration) -> Self {
        self.valve_interval = interval;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Build settings from a validated device definition.
    pub fn from_def(def: &DeviceDef, valve_interval_s: f64) -> DriverResult<Self> {
        if !(valve_interval_s.is_finite() && valve_interval_s > 0.0) {
            return Err(DriverError::InvalidSettings {
                what: format!("valve interval must be positive, got {valve_interval_s}"),
            });
        }
        let mut settings = Self::new(
            def.id.as_str(),
            def.trv_entity.as_str(),
            def.reference_temp_entity.as_str(),
            def.target_temp_entity.as_str(),
        )
        .with_valve_interval(Duration::from_secs_f64(valve_interval_s));
        settings.name = def.name.clone();
        settings.valve = def.valve_position_entity.as_deref().map(EntityRef::from);
        Ok(settings)
    }

    /// The three entities whose changes trigger a full cycle.
    pub fn watched(&self) -> [&EntityRef; 3] {
        [&self.reference, &self.target, &self.trv]
    }

    pub fn is_watched(&self, entity: &EntityRef) -> bool {
        self.watched().contains(&entity)
    }
}

/// Event-driven phase of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    AwaitingInputs,
    Active,
}

/// What was done to the valve in one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValveAction {
    /// TRV idle: valve opened fully, controller untouched.
    FailOpen,
    /// Controller ran and produced this step.
    Regulated(PiStep),
}

impl ValveAction {
    pub fn position(&self) -> u8 {
        match self {
            ValveAction::FailOpen => FAIL_OPEN_POSITION,
            ValveAction::Regulated(step) => step.position,
        }
    }
}

/// Result of one cycle. Failures inside a cycle are logged, not returned.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A reading was missing; nothing was commanded.
    AwaitingInputs { attempts: u32 },
    /// Full cycle: TRV setpoint commanded, valve driven if configured.
    Active {
        compensation: Compensation,
        trv_accepted: bool,
        valve: Option<ValveAction>,
    },
    /// Timer tick that drove the valve.
    ValveOnly { valve: ValveAction },
    /// Timer tick with nothing to do.
    Skipped,
}

enum Dispatch {
    Await,
    Detach,
}

/// Run an actuator command, giving up after `limit`.
async fn bounded<F>(entity: &EntityRef, limit: Duration, command: F) -> Result<(), BusError>
where
    F: Future<Output = Result<(), BusError>>,
{
    match time::timeout(limit, command).await {
        Ok(result) => result,
        Err(_) => Err(BusError::Timeout {
            entity: entity.clone(),
        }),
    }
}

/// Compensator and valve controller for one device, bound to a bus.
pub struct DeviceLoop {
    settings: DeviceSettings,
    controller: ValveController,
    startup_attempts: u32,
    phase: LoopPhase,
    bus: Arc<dyn HomeBus>,
    clock: Arc<dyn Clock>,
    diagnostics: DiagnosticsPublisher,
    pending_valve: Option<JoinHandle<()>>,
}

impl DeviceLoop {
    pub fn new(
        settings: DeviceSettings,
        config: ControllerConfig,
        bus: Arc<dyn HomeBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            controller: ValveController::new(config),
            startup_attempts: 0,
            phase: LoopPhase::AwaitingInputs,
            bus,
            clock,
            diagnostics: DiagnosticsPublisher::new(),
            pending_valve: None,
        }
    }

    /// Build a loop from a device definition.
    ///
    /// # Errors
    ///
    /// Returns error if the gains are out of bounds or the interval is not positive.
    pub fn from_def(
        def: &DeviceDef,
        valve_interval_s: f64,
        bus: Arc<dyn HomeBus>,
        clock: Arc<dyn Clock>,
    ) -> DriverResult<Self> {
        let settings = DeviceSettings::from_def(def, valve_interval_s)?;
        let config = ControllerConfig::new(def.p_gain, def.i_gain)?;
        Ok(Self::new(settings, config, bus, clock))
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn controller(&self) -> &ValveController {
        &self.controller
    }

    pub fn startup_attempts(&self) -> u32 {
        self.startup_attempts
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn bus(&self) -> &Arc<dyn HomeBus> {
        &self.bus
    }

    pub fn diagnostics(&self) -> &DiagnosticsPublisher {
        &self.diagnostics
    }

    /// Apply new gains. Integrator and timestamp are kept.
    pub fn reconfigure(&mut self, update: GainUpdate) -> ControlResult<()> {
        self.controller.reconfigure(update)?;
        info!(
            device = %self.settings.id,
            p_gain = self.controller.config().p_gain(),
            i_gain = self.controller.config().i_gain(),
            "controller gains updated"
        );
        Ok(())
    }

    async fn observe(&self) -> ObservedSample {
        let bus = self.bus.as_ref();
        ObservedSample {
            reference: read_numeric(bus, &self.settings.reference).await,
            target: read_numeric(bus, &self.settings.target).await,
            trv: read_trv(bus, &self.settings.trv).await,
        }
    }

    /// Event-driven cycle: compensate, command the TRV, then drive the valve.
    pub async fn full_cycle(&mut self) -> CycleOutcome {
        let sample = self.observe().await;

        let Some((reference, target, trv_local)) = sample.complete() else {
            return self.await_inputs(&sample);
        };

        if self.startup_attempts > 0 {
            info!(
                device = %self.settings.id,
                attempts = self.startup_attempts,
                "all readings available, starting control"
            );
        }
        self.startup_attempts = 0;
        self.phase = LoopPhase::Active;

        let compensation = compensate(target, reference, trv_local);
        let trv_accepted = match bounded(
            &self.settings.trv,
            self.settings.command_timeout,
            self.bus
                .set_trv_target(&self.settings.trv, compensation.adjusted_target),
        )
        .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    device = %self.settings.id,
                    entity = %self.settings.trv,
                    setpoint = compensation.adjusted_target,
                    error = %err,
                    "failed to set TRV target"
                );
                false
            }
        };

        let error = target - reference;
        let valve = match self.settings.valve.clone() {
            Some(entity) => Some(
                self.drive_valve(&entity, error, &sample.trv, Dispatch::Await)
                    .await,
            ),
            None => None,
        };

        self.diagnostics.publish(PublishedDiagnostics {
            error: Some(error),
            integrator: self.controller.integrator(),
            temperature_adjustment: Some(compensation.adjustment(target)),
            valve_output: valve.map(|v| v.position()),
            hvac_action: sample.trv.activity.clone(),
            reference_temp: Some(reference),
            target_temp: Some(target),
            trv_temp: Some(trv_local),
            kind: CycleKind::Full,
            updated_at: Some(self.clock.now()),
        });

        CycleOutcome::Active {
            compensation,
            trv_accepted,
            valve,
        }
    }

    fn await_inputs(&mut self, sample: &ObservedSample) -> CycleOutcome {
        self.startup_attempts = self.startup_attempts.saturating_add(1);
        let attempts = self.startup_attempts;
        let missing = sample.missing().join(", ");
        if attempts <= STARTUP_QUIET_ATTEMPTS {
            info!(device = %self.settings.id, attempts, missing = %missing, "waiting for readings");
        } else {
            warn!(device = %self.settings.id, attempts, missing = %missing, "readings still unavailable");
        }

        let previous = self.diagnostics.current();
        self.diagnostics.publish(PublishedDiagnostics {
            error: sample.target.zip(sample.reference).map(|(t, r)| t - r),
            integrator: self.controller.integrator(),
            temperature_adjustment: None,
            valve_output: previous.valve_output,
            hvac_action: sample.trv.activity.clone(),
            reference_temp: sample.reference,
            target_temp: sample.target,
            trv_temp: sample.trv.current_temperature,
            kind: CycleKind::AwaitingInputs,
            updated_at: Some(self.clock.now()),
        });

        CycleOutcome::AwaitingInputs { attempts }
    }

    /// Timer cycle: drive the valve without touching the TRV setpoint.
    ///
    /// The valve command is not awaited; see [`flush`](Self::flush).
    pub async fn valve_cycle(&mut self) -> CycleOutcome {
        let Some(entity) = self.settings.valve.clone() else {
            return CycleOutcome::Skipped;
        };

        let bus = self.bus.as_ref();
        let reference = read_numeric(bus, &self.settings.reference).await;
        let target = read_numeric(bus, &self.settings.target).await;
        let (Some(reference), Some(target)) = (reference, target) else {
            debug!(device = %self.settings.id, "skipping valve update, readings unavailable");
            return CycleOutcome::Skipped;
        };
        let trv = read_trv(bus, &self.settings.trv).await;

        let error = target - reference;
        let valve = self.drive_valve(&entity, error, &trv, Dispatch::Detach).await;

        let previous = self.diagnostics.current();
        self.diagnostics.publish(PublishedDiagnostics {
            error: Some(error),
            integrator: self.controller.integrator(),
            valve_output: Some(valve.position()),
            hvac_action: trv.activity.clone(),
            reference_temp: Some(reference),
            target_temp: Some(target),
            trv_temp: trv.current_temperature.or(previous.trv_temp),
            kind: CycleKind::ValveOnly,
            updated_at: Some(self.clock.now()),
            ..previous
        });

        CycleOutcome::ValveOnly { valve }
    }

    async fn drive_valve(
        &mut self,
        entity: &EntityRef,
        error: f64,
        trv: &TrvReading,
        dispatch: Dispatch,
    ) -> ValveAction {
        let action = if trv.is_idle() {
            debug!(device = %self.settings.id, "TRV idle, opening valve fully");
            ValveAction::FailOpen
        } else {
            ValveAction::Regulated(self.controller.update_at(error, self.clock.now()))
        };
        let position = action.position();
        let limit = self.settings.command_timeout;

        match dispatch {
            Dispatch::Await => {
                let command = self.bus.set_valve_position(entity, position);
                if let Err(err) = bounded(entity, limit, command).await {
                    warn!(
                        device = %self.settings.id,
                        entity = %entity,
                        position,
                        error = %err,
                        "failed to set valve position"
                    );
                }
            }
            Dispatch::Detach => {
                // a newer command supersedes one still in flight
                self.flush().await;
                let bus = Arc::clone(&self.bus);
                let entity = entity.clone();
                let device = self.settings.id.clone();
                self.pending_valve = Some(tokio::spawn(async move {
                    let command = bus.set_valve_position(&entity, position);
                    if let Err(err) = bounded(&entity, limit, command).await {
                        warn!(
                            device = %device,
                            entity = %entity,
                            position,
                            error = %err,
                            "failed to set valve position"
                        );
                    }
                }));
            }
        }
        action
    }

    /// Wait for a detached valve command, if one is still running.
    pub async fn flush(&mut self) {
        if let Some(pending) = self.pending_valve.take() {
            if let Err(err) = pending.await {
                warn!(device = %self.settings.id, error = %err, "valve command task failed");
            }
        }
    }
}

impl std::fmt::Debug for DeviceLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLoop")
            .field("settings", &self.settings)
            .field("controller", &self.controller)
            .field("startup_attempts", &self.startup_attempts)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_def_carry_entities() {
        let def = DeviceDef::new("bedroom", "climate.bedroom", "sensor.bedroom", "input_number.bedroom")
            .with_valve("number.bedroom_valve");
        let settings = DeviceSettings::from_def(&def, 30.0).unwrap();
        assert_eq!(settings.trv.as_str(), "climate.bedroom");
        assert_eq!(settings.valve.as_ref().map(EntityRef::as_str), Some("number.bedroom_valve"));
        assert_eq!(settings.valve_interval, Duration::from_secs(30));
        assert!(settings.is_watched(&EntityRef::from("sensor.bedroom")));
        assert!(!settings.is_watched(&EntityRef::from("number.bedroom_valve")));
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let def = DeviceDef::new("a", "climate.a", "sensor.a", "input_number.a");
        assert!(DeviceSettings::from_def(&def, 0.0).is_err());
        assert!(DeviceSettings::from_def(&def, f64::NAN).is_err());
    }

    #[test]
    fn command_timeout_defaults_and_overrides() {
        let settings = DeviceSettings::new("a", "climate.a", "sensor.a", "input_number.a");
        assert_eq!(settings.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        let settings = settings.with_command_timeout(Duration::from_secs(2));
        assert_eq!(settings.command_timeout, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_command_times_out() {
        let entity = EntityRef::from("number.a_valve");
        let stuck = std::future::pending::<Result<(), BusError>>();
        let err = bounded(&entity, Duration::from_secs(5), stuck)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout { entity: e } if e == entity));

        let quick = async { Ok(()) };
        assert!(bounded(&entity, Duration::from_secs(5), quick).await.is_ok());
    }

    #[test]
    fn fail_open_position_is_full() {
        assert_eq!(ValveAction::FailOpen.position(), 100);
    }
}
