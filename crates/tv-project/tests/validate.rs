use tv_project::schema::*;
use tv_project::{ValidationError, from_json_str, from_yaml_str, validate_project};

fn device(id: &str) -> DeviceDef {
    DeviceDef::new(
        id,
        format!("climate.{id}_trv"),
        format!("sensor.{id}_temperature"),
        format!("input_number.{id}_target"),
    )
}

#[test]
fn accepts_gain_bounds_inclusive() {
    let project = Project::new(
        "Bounds",
        vec![device("a").with_gains(0.0, 0.0), device("b").with_gains(50.0, 5.0)],
    );
    validate_project(&project).unwrap();
}

#[test]
fn rejects_out_of_range_gains() {
    for (p, i) in [(-1.0, 0.5), (50.5, 0.5), (10.0, 5.1), (f64::NAN, 0.5)] {
        let project = Project::new("Gains", vec![device("a").with_gains(p, i)]);
        let err = validate_project(&project).unwrap_err();
        assert!(
            matches!(err, ValidationError::InvalidValue { .. }),
            "expected invalid value for p={p} i={i}"
        );
    }
}

#[test]
fn rejects_duplicate_device_ids() {
    let mut second = device("b");
    second.id = "a".to_string();
    let project = Project::new("Dup", vec![device("a"), second]);
    assert!(matches!(
        validate_project(&project),
        Err(ValidationError::DuplicateId { .. })
    ));
}

#[test]
fn rejects_two_controllers_for_one_trv() {
    let mut second = device("b");
    second.trv_entity = "climate.a_trv".to_string();
    let project = Project::new("Shared", vec![device("a"), second]);
    let err = validate_project(&project).unwrap_err();
    assert!(err.to_string().contains("climate.a_trv"));
}

#[test]
fn rejects_empty_entity_and_empty_project() {
    let mut bad = device("a");
    bad.reference_temp_entity = " ".to_string();
    assert!(validate_project(&Project::new("Empty entity", vec![bad])).is_err());

    assert!(matches!(
        validate_project(&Project::new("Nothing", vec![])),
        Err(ValidationError::NoDevices { .. })
    ));
}

#[test]
fn rejects_non_positive_interval_and_future_version() {
    let mut project = Project::new("Interval", vec![device("a")]);
    project.valve_interval_s = 0.0;
    assert!(validate_project(&project).is_err());

    let mut project = Project::new("Future", vec![device("a")]);
    project.version = 3;
    assert!(matches!(
        validate_project(&project),
        Err(ValidationError::UnsupportedVersion { version: 3 })
    ));
}

#[test]
fn rejects_top_level_device_fields_in_v2() {
    let content = r#"
version: 2
name: Mixed
trv_entity: climate.x
devices:
  - id: a
    trv_entity: climate.a
    reference_temp_entity: sensor.a
    target_temp_entity: input_number.a
    name: A
"#;
    assert!(from_yaml_str(content).is_err());
}

#[test]
fn json_single_device_is_migrated() {
    let content = r#"{
        "version": 1,
        "name": "Office",
        "trv_entity": "climate.office_trv",
        "reference_temp_entity": "sensor.office",
        "target_temp_entity": "input_number.office_target"
    }"#;
    let project = from_json_str(content).unwrap();
    assert_eq!(project.devices.len(), 1);
    assert_eq!(project.devices[0].id, "office_trv");
    assert!(project.devices[0].valve_position_entity.is_none());
}
