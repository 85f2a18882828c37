//! Configuration file schema.

use serde::{Deserialize, Serialize};
use tv_controls::limits::{DEFAULT_I_GAIN, DEFAULT_P_GAIN, VALVE_UPDATE_INTERVAL_S};

/// A hub: one or more managed radiators sharing a maintenance cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub version: u32,
    pub name: String,
    /// Period of the valve maintenance timer.
    #[serde(default = "default_valve_interval_s")]
    pub valve_interval_s: f64,
    #[serde(default)]
    pub devices: Vec<DeviceDef>,
    /// Version 1 single-device fields. Emptied by migration.
    #[serde(flatten)]
    pub legacy: LegacyDeviceDef,
}

impl Project {
    pub fn new(name: impl Into<String>, devices: Vec<DeviceDef>) -> Self {
        Self {
            version: crate::migrate::LATEST_VERSION,
            name: name.into(),
            valve_interval_s: VALVE_UPDATE_INTERVAL_S,
            devices,
            legacy: LegacyDeviceDef::default(),
        }
    }

    pub fn device(&self, id: &str) -> Option<&DeviceDef> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// One TRV with its reference/target sensors and optional auxiliary valve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDef {
    pub id: String,
    pub name: String,
    pub trv_entity: String,
    pub reference_temp_entity: String,
    pub target_temp_entity: String,
    /// Without a valve only the setpoint compensation runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valve_position_entity: Option<String>,
    #[serde(default = "default_p_gain")]
    pub p_gain: f64,
    #[serde(default = "default_i_gain")]
    pub i_gain: f64,
}

impl DeviceDef {
    pub fn new(
        id: impl Into<String>,
        trv_entity: impl Into<String>,
        reference_temp_entity: impl Into<String>,
        target_temp_entity: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            trv_entity: trv_entity.into(),
            reference_temp_entity: reference_temp_entity.into(),
            target_temp_entity: target_temp_entity.into(),
            valve_position_entity: None,
            p_gain: DEFAULT_P_GAIN,
            i_gain: DEFAULT_I_GAIN,
        }
    }

    pub fn with_valve(mut self, valve_position_entity: impl Into<String>) -> Self {
        self.valve_position_entity = Some(valve_position_entity.into());
        self
    }

    pub fn with_gains(mut self, p_gain: f64, i_gain: f64) -> Self {
        self.p_gain = p_gain;
        self.i_gain = i_gain;
        self
    }
}

/// Top-level device fields of a version 1 file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LegacyDeviceDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trv_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_temp_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temp_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valve_position_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i_gain: Option<f64>,
}

impl LegacyDeviceDef {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn default_valve_interval_s() -> f64 {
    VALVE_UPDATE_INTERVAL_S
}

fn default_p_gain() -> f64 {
    DEFAULT_P_GAIN
}

fn default_i_gain() -> f64 {
    DEFAULT_I_GAIN
}
