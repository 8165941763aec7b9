use light_harness::config::HarnessConfig;
use light_harness::dtype::DType;
use light_harness::error::ConfigError;
use light_harness::seed::Device;
use tempfile::TempDir;

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let config = HarnessConfig {
        seed: 7,
        dtype: DType::F64,
        devices: vec![Device::Cpu, Device::Accelerator(0)],
        learning_rate: 0.5,
        epochs: 3,
    };
    config.save(&path).unwrap();
    assert_eq!(HarnessConfig::load(&path).unwrap(), config);
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = HarnessConfig::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_load_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"learning_rate": -0.1}"#).unwrap();
    assert!(matches!(HarnessConfig::load(&path), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_saved_file_is_plain_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    HarnessConfig::default().save(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["seed"], 42);
    assert_eq!(value["dtype"], "f32");
    assert_eq!(value["devices"][0], "cpu");
}
