//! Entity references and raw entity states as seen on the bus.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

/// Identifier of an external entity, e.g. `sensor.bedroom_temperature`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// State string plus attributes, as published by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub state: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EntityState {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// `unavailable` or `unknown`.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.state.as_str(), STATE_UNAVAILABLE | STATE_UNKNOWN)
    }
}
