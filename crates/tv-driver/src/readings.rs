//! Conversion of raw entity states into controller inputs.
//!
//! Any reading may be absent: the entity may not exist, report `unavailable`
//! or `unknown`, or carry a value that is not a finite number. Absence is
//! never an error here; the loop driver decides what to do with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::bus::HomeBus;
use crate::entity::{EntityRef, EntityState};

const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
const ATTR_HVAC_ACTION: &str = "hvac_action";
const ACTION_IDLE: &str = "idle";

/// What the TRV reports it is doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HvacAction {
    /// Not calling for heat.
    Idle,
    /// Anything else (`heating`, `off`, vendor-specific values).
    Other(String),
}

impl HvacAction {
    pub fn as_str(&self) -> &str {
        match self {
            HvacAction::Idle => ACTION_IDLE,
            HvacAction::Other(action) => action,
        }
    }
}

impl From<&str> for HvacAction {
    fn from(action: &str) -> Self {
        if action == ACTION_IDLE {
            HvacAction::Idle
        } else {
            HvacAction::Other(action.to_string())
        }
    }
}

impl From<String> for HvacAction {
    fn from(action: String) -> Self {
        HvacAction::from(action.as_str())
    }
}

impl From<HvacAction> for String {
    fn from(action: HvacAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for HvacAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two TRV attributes the driver uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrvReading {
    pub current_temperature: Option<f64>,
    pub activity: Option<HvacAction>,
}

impl TrvReading {
    /// Only an explicit `idle` counts; an absent activity is treated as active.
    pub fn is_idle(&self) -> bool {
        matches!(self.activity, Some(HvacAction::Idle))
    }
}

/// Everything one cycle reads from the bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedSample {
    pub reference: Option<f64>,
    pub target: Option<f64>,
    pub trv: TrvReading,
}

impl ObservedSample {
    /// `(reference, target, trv_local)` when all three are present.
    pub fn complete(&self) -> Option<(f64, f64, f64)> {
        Some((self.reference?, self.target?, self.trv.current_temperature?))
    }

    /// Names of the missing readings, for logging.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.reference.is_none() {
            missing.push("reference");
        }
        if self.target.is_none() {
            missing.push("target");
        }
        if self.trv.current_temperature.is_none() {
            missing.push("trv_temperature");
        }
        missing
    }
}

/// Interpret an entity's state string as a temperature.
pub fn numeric_state(entity: &EntityRef, state: Option<&EntityState>) -> Option<f64> {
    let state = state?;
    if state.is_unavailable() {
        return None;
    }
    match state.state.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(entity = %entity, state = %state.state, "could not convert state to a number");
            None
        }
    }
}

/// Extract the TRV's own temperature and activity from its attributes.
pub fn trv_reading(state: Option<&EntityState>) -> TrvReading {
    let Some(state) = state.filter(|s| !s.is_unavailable()) else {
        return TrvReading::default();
    };
    TrvReading {
        current_temperature: state
            .attributes
            .get(ATTR_CURRENT_TEMPERATURE)
            .and_then(json_number),
        activity: state
            .attributes
            .get(ATTR_HVAC_ACTION)
            .and_then(Value::as_str)
            .map(HvacAction::from),
    }
}

fn json_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

pub async fn read_numeric(bus: &dyn HomeBus, entity: &EntityRef) -> Option<f64> {
    let state = bus.entity_state(entity).await;
    numeric_state(entity, state.as_ref())
}

pub async fn read_trv(bus: &dyn HomeBus, entity: &EntityRef) -> TrvReading {
    let state = bus.entity_state(entity).await;
    trv_reading(state.as_ref())
}
