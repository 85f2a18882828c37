//! Project validation logic.

use crate::schema::{DeviceDef, Project};
use std::collections::HashSet;
use tv_controls::limits::{MAX_I_GAIN, MAX_P_GAIN, MIN_I_GAIN, MIN_P_GAIN};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Project '{name}' has no devices")]
    NoDevices { name: String },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_project(project: &Project) -> Result<(), ValidationError> {
    if project.version > crate::migrate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: project.version,
        });
    }

    if !project.legacy.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "top-level device fields".to_string(),
            value: format!("{:?}", project.legacy),
            reason: format!(
                "only allowed in version 1 files, this is version {}",
                project.version
            ),
        });
    }

    if !project.valve_interval_s.is_finite() || project.valve_interval_s <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "valve_interval_s".to_string(),
            value: project.valve_interval_s.to_string(),
            reason: "must be positive and finite".to_string(),
        });
    }

    if project.devices.is_empty() {
        return Err(ValidationError::NoDevices {
            name: project.name.clone(),
        });
    }

    let mut device_ids = HashSet::new();
    let mut trv_entities = HashSet::new();
    for device in &project.devices {
        if !device_ids.insert(&device.id) {
            return Err(ValidationError::DuplicateId {
                id: device.id.clone(),
                context: "devices".to_string(),
            });
        }
        // One controller per TRV.
        if !trv_entities.insert(&device.trv_entity) {
            return Err(ValidationError::DuplicateId {
                id: device.trv_entity.clone(),
                context: "devices trv_entity".to_string(),
            });
        }
        validate_device(device)?;
    }

    Ok(())
}

fn validate_device(device: &DeviceDef) -> Result<(), ValidationError> {
    if device.id.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "device id".to_string(),
            value: device.id.clone(),
            reason: "must not be empty".to_string(),
        });
    }

    let mut entities = vec![
        ("trv_entity", device.trv_entity.as_str()),
        ("reference_temp_entity", device.reference_temp_entity.as_str()),
        ("target_temp_entity", device.target_temp_entity.as_str()),
    ];
    if let Some(valve) = &device.valve_position_entity {
        entities.push(("valve_position_entity", valve.as_str()));
    }
    for (field, entity) in entities {
        if entity.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("device '{}' {}", device.id, field),
                value: entity.to_string(),
                reason: "must not be empty".to_string(),
            });
        }
    }

    check_gain(device, "p_gain", device.p_gain, MIN_P_GAIN, MAX_P_GAIN)?;
    check_gain(device, "i_gain", device.i_gain, MIN_I_GAIN, MAX_I_GAIN)?;
    Ok(())
}

fn check_gain(
    device: &DeviceDef,
    field: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ValidationError::InvalidValue {
            field: format!("device '{}' {}", device.id, field),
            value: value.to_string(),
            reason: format!("must be within [{}, {}]", min, max),
        });
    }
    Ok(())
}
