//! Closed-loop run of one device against a simulated room.
//!
//! The room is a first-order model: the radiator adds heat in proportion to
//! the flow it gets, the room loses heat to the outside. The TRV heats when its
//! own sensor reads below its setpoint, and that sensor sits close to the
//! radiator, so it reads warmer the more the radiator heats.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::broadcast::error::TryRecvError;
use tv_driver::{Clock, DeviceLoop, EntityRef, HomeBus, ManualClock, MemoryBus, PublishedDiagnostics};
use tv_project::DeviceDef;

use crate::error::{CliError, CliResult};

/// Heating rate at full flow, °C per minute.
const HEAT_RATE: f64 = 0.12;
/// Loss coefficient towards the outside, per minute.
const LOSS_RATE: f64 = 0.004;
/// TRV sensor offset with a cold radiator.
const TRV_BASE_BIAS: f64 = 0.5;
/// Additional TRV sensor offset with the radiator at full output.
const TRV_HEAT_BIAS: f64 = 4.0;
const TRV_HYSTERESIS: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct SimOptions {
    pub minutes: f64,
    pub step_s: f64,
    pub target: f64,
    pub start: f64,
    pub outside: f64,
}

#[derive(Debug, Clone, Copy)]
struct Room {
    temperature: f64,
    outside: f64,
    /// Radiator output in `[0, 1]` during the last step.
    power: f64,
    heating: bool,
}

impl Room {
    fn trv_local(&self) -> f64 {
        self.temperature + TRV_BASE_BIAS + TRV_HEAT_BIAS * self.power
    }

    /// Advance by `dt_s` with the TRV at `setpoint` and the valve at `valve` percent.
    fn advance(&mut self, dt_s: f64, setpoint: Option<f64>, valve: f64) {
        let local = self.trv_local();
        self.heating = match setpoint {
            Some(sp) if self.heating => local < sp + TRV_HYSTERESIS,
            Some(sp) => local < sp - TRV_HYSTERESIS,
            None => false,
        };
        self.power = if self.heating { valve / 100.0 } else { 0.0 };

        let dt_min = dt_s / 60.0;
        let gain = HEAT_RATE * self.power;
        let loss = LOSS_RATE * (self.temperature - self.outside);
        self.temperature += dt_min * (gain - loss);
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub async fn run(
    def: &DeviceDef,
    valve_interval_s: f64,
    options: SimOptions,
) -> CliResult<PublishedDiagnostics> {
    if !(options.step_s.is_finite() && options.step_s > 0.0) {
        return Err(CliError::InvalidArg {
            what: format!("step must be positive, got {}", options.step_s),
        });
    }
    if !(options.minutes.is_finite() && options.minutes > 0.0) {
        return Err(CliError::InvalidArg {
            what: format!("duration must be positive, got {}", options.minutes),
        });
    }

    let bus = Arc::new(MemoryBus::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let trv = EntityRef::from(def.trv_entity.as_str());
    let reference = EntityRef::from(def.reference_temp_entity.as_str());
    let target = EntityRef::from(def.target_temp_entity.as_str());
    let valve = def.valve_position_entity.as_deref().map(EntityRef::from);

    let mut room = Room {
        temperature: options.start,
        outside: options.outside,
        power: 0.0,
        heating: false,
    };

    bus.set_number(target, options.target);
    bus.set_number(reference.clone(), round1(room.temperature));
    bus.set_trv(trv.clone(), Some(round1(room.trv_local())), Some("idle"));
    if let Some(valve) = &valve {
        bus.set_state(valve.clone(), "100");
    }

    let mut device = DeviceLoop::from_def(def, valve_interval_s, bus.clone(), clock.clone())?;
    let mut changes = bus.subscribe_changes();
    let start = clock.now();

    println!(
        "Simulating '{}' for {} min (step {} s, target {:.1} °C)",
        def.id, options.minutes, options.step_s, options.target
    );
    println!(
        "{:>8} {:>7} {:>7} {:>8} {:>6} {:>11}",
        "t_min", "room", "trv", "setpoint", "valve", "integrator"
    );

    device.full_cycle().await;

    let steps = (options.minutes * 60.0 / options.step_s).ceil() as u64;
    let step = Duration::milliseconds((options.step_s * 1000.0).round() as i64);
    let mut since_valve_s = 0.0;

    for _ in 0..steps {
        clock.advance(step);
        since_valve_s += options.step_s;

        let setpoint = bus
            .state(&trv)
            .and_then(|s| s.attributes.get("temperature").and_then(|v| v.as_f64()));
        let valve_pct = match &valve {
            Some(valve) => bus
                .state(valve)
                .and_then(|s| s.state.parse::<f64>().ok())
                .unwrap_or(100.0),
            None => 100.0,
        };
        room.advance(options.step_s, setpoint, valve_pct);

        bus.set_number(reference.clone(), round1(room.temperature));
        let action = if room.heating { "heating" } else { "idle" };
        bus.set_trv(trv.clone(), Some(round1(room.trv_local())), Some(action));

        let mut changed = false;
        loop {
            match changes.try_recv() {
                Ok(entity) => changed |= device.settings().is_watched(&entity),
                Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if changed {
            device.full_cycle().await;
        }
        if since_valve_s >= valve_interval_s {
            since_valve_s = 0.0;
            device.valve_cycle().await;
            device.flush().await;
        }

        let diag = device.diagnostics().current();
        let elapsed_min = (clock.now() - start).num_milliseconds() as f64 / 60_000.0;
        println!(
            "{:>8.1} {:>7.2} {:>7.2} {:>8} {:>6} {:>11.3}",
            elapsed_min,
            room.temperature,
            room.trv_local(),
            setpoint.map_or_else(|| "-".to_string(), |sp| format!("{sp:.1}")),
            diag.valve_output
                .map_or_else(|| "-".to_string(), |v| v.to_string()),
            diag.integrator,
        );
    }

    Ok(device.diagnostics().current())
}
