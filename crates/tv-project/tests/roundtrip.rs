use tv_project::schema::*;
use tv_project::{load_json, load_yaml, save_json, save_yaml, validate_project};

fn sample_project() -> Project {
    Project::new(
        "Ground Floor",
        vec![
            DeviceDef::new(
                "kitchen",
                "climate.kitchen_trv",
                "sensor.kitchen_temperature",
                "input_number.kitchen_target",
            )
            .with_valve("number.kitchen_valve")
            .with_gains(12.5, 0.75),
            DeviceDef::new(
                "hall",
                "climate.hall_trv",
                "sensor.hall_temperature",
                "input_number.hall_target",
            ),
        ],
    )
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("tv_project_{}_{}", std::process::id(), name))
}

#[test]
fn roundtrip_yaml_hub() {
    let project = sample_project();
    validate_project(&project).unwrap();

    let path = temp_path("roundtrip.yaml");
    save_yaml(&path, &project).unwrap();
    let loaded = load_yaml(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(project, loaded);
}

#[test]
fn roundtrip_json_hub() {
    let project = sample_project();

    let path = temp_path("roundtrip.json");
    save_json(&path, &project).unwrap();
    let loaded = load_json(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(project, loaded);
}

#[test]
fn save_refuses_invalid_project() {
    let mut project = sample_project();
    project.devices[0].p_gain = 75.0;

    let path = temp_path("invalid.yaml");
    assert!(save_yaml(&path, &project).is_err());
    assert!(!path.exists());
}

#[test]
fn yaml_omits_legacy_fields() {
    let content = serde_yaml::to_string(&sample_project()).unwrap();
    assert!(content.contains("devices:"));
    assert!(!content.contains("trv_entity: null"));
}
