//! Schema migration framework.

use crate::ProjectError;
use crate::schema::{DeviceDef, LegacyDeviceDef, Project};
use tv_controls::limits::{DEFAULT_I_GAIN, DEFAULT_P_GAIN};

pub const LATEST_VERSION: u32 = 2;

pub fn migrate_to_latest(mut project: Project) -> Result<Project, ProjectError> {
    while project.version < LATEST_VERSION {
        project = migrate_one_version(project)?;
    }
    Ok(project)
}

fn migrate_one_version(project: Project) -> Result<Project, ProjectError> {
    match project.version {
        1 => migrate_v1_to_v2(project),
        v => Err(ProjectError::Migration {
            what: format!("No migration path from version {}", v),
        }),
    }
}

/// Version 1 described exactly one TRV with top-level fields. Version 2 is a
/// hub with a `devices` list.
fn migrate_v1_to_v2(mut project: Project) -> Result<Project, ProjectError> {
    let legacy = std::mem::take(&mut project.legacy);

    if !legacy.is_empty() {
        if !project.devices.is_empty() {
            return Err(ProjectError::Migration {
                what: "version 1 file mixes top-level device fields with a devices list"
                    .to_string(),
            });
        }
        project.devices.push(device_from_legacy(&project.name, legacy)?);
    }

    project.version = 2;
    Ok(project)
}

fn device_from_legacy(name: &str, legacy: LegacyDeviceDef) -> Result<DeviceDef, ProjectError> {
    let missing = |field: &str| ProjectError::Migration {
        what: format!("version 1 file is missing '{}'", field),
    };

    let trv_entity = legacy.trv_entity.ok_or_else(|| missing("trv_entity"))?;
    let id = trv_entity
        .rsplit('.')
        .next()
        .unwrap_or(trv_entity.as_str())
        .to_string();

    Ok(DeviceDef {
        id,
        name: name.to_string(),
        reference_temp_entity: legacy
            .reference_temp_entity
            .ok_or_else(|| missing("reference_temp_entity"))?,
        target_temp_entity: legacy
            .target_temp_entity
            .ok_or_else(|| missing("target_temp_entity"))?,
        trv_entity,
        valve_position_entity: legacy.valve_position_entity,
        p_gain: legacy.p_gain.unwrap_or(DEFAULT_P_GAIN),
        i_gain: legacy.i_gain.unwrap_or(DEFAULT_I_GAIN),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_project() -> Project {
        let mut project = Project::new("Living Room", vec![]);
        project.version = 1;
        project.legacy = LegacyDeviceDef {
            trv_entity: Some("climate.living_room_trv".to_string()),
            reference_temp_entity: Some("sensor.living_room".to_string()),
            target_temp_entity: Some("input_number.living_room_target".to_string()),
            valve_position_entity: None,
            p_gain: Some(12.0),
            i_gain: None,
        };
        project
    }

    #[test]
    fn v1_single_device_becomes_hub() {
        let project = migrate_to_latest(v1_project()).unwrap();
        assert_eq!(project.version, LATEST_VERSION);
        assert!(project.legacy.is_empty());
        assert_eq!(project.devices.len(), 1);

        let device = &project.devices[0];
        assert_eq!(device.id, "living_room_trv");
        assert_eq!(device.name, "Living Room");
        assert_eq!(device.p_gain, 12.0);
        assert_eq!(device.i_gain, DEFAULT_I_GAIN);
        assert!(device.valve_position_entity.is_none());
    }

    #[test]
    fn v1_missing_entity_fails() {
        let mut project = v1_project();
        project.legacy.target_temp_entity = None;
        let err = migrate_to_latest(project).unwrap_err();
        assert!(err.to_string().contains("target_temp_entity"));
    }

    #[test]
    fn unknown_old_version_fails() {
        let mut project = v1_project();
        project.version = 0;
        assert!(matches!(
            migrate_to_latest(project),
            Err(ProjectError::Migration { .. })
        ));
    }
}
