//! Configuration loading and precedence tests

use pretty_assertions::assert_eq;
use residue_config::{
    CaptureConfig, CarrierStyle, ConfigError, ConfigLoader, ResidueConfig, Strategy,
    CONFIG_FILE_NAME, DEFAULT_MAX_CALL_DEPTH,
};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

struct EnvGuard(&'static [&'static str]);

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in self.0 {
            env::remove_var(key);
        }
    }
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let loader = ConfigLoader::with_env(|_| None);
    let loaded = loader.load_from_directory(temp_dir.path()).unwrap();

    assert!(!loaded.is_project());
    assert_eq!(loaded.capture(), CaptureConfig::default());
    assert_eq!(loaded.runtime().max_call_depth, DEFAULT_MAX_CALL_DEPTH);
}

#[test]
fn test_load_from_nested_subdirectory() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[capture]
carrier = "keyword"
carrier-name = "_frame"
"#,
    );
    let nested = temp_dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let loaded = ConfigLoader::with_env(|_| None)
        .load_from_directory(&nested)
        .unwrap();

    let capture = loaded.capture();
    assert_eq!(capture.carrier, CarrierStyle::Keyword);
    assert_eq!(capture.carrier_name.as_deref(), Some("_frame"));
    assert_eq!(loaded.root(), Some(temp_dir.path()));
}

#[test]
fn test_load_from_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[runtime]\nmax-call-depth = 99\n");

    let loaded = ConfigLoader::with_env(|_| None)
        .load_from_file(&path)
        .unwrap();

    assert_eq!(loaded.runtime().max_call_depth, 99);
    assert_eq!(loaded.root(), Some(temp_dir.path()));
}

#[test]
fn test_missing_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigLoader::with_env(|_| None)
        .load_from_file(&temp_dir.path().join(CONFIG_FILE_NAME));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_invalid_toml_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[capture\nstrategy = ");

    match ResidueConfig::load_from_file(&path) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_unknown_strategy_value() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[capture]\nstrategy = \"inline\"\n");

    let result = ConfigLoader::with_env(|_| None).load_from_directory(temp_dir.path());
    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

// ============================================================================
// Environment Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_process_env_overrides_project() {
    let _guard = EnvGuard(&["RESIDUE_STRATEGY", "RESIDUE_VALIDATE"]);
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[capture]\nvalidate = true\n");

    env::set_var("RESIDUE_STRATEGY", "trace");
    env::set_var("RESIDUE_VALIDATE", "no");

    let loaded = ConfigLoader::new()
        .load_from_directory(temp_dir.path())
        .unwrap();

    let capture = loaded.capture();
    assert_eq!(capture.strategy, Strategy::Trace);
    assert!(!capture.validate);
}

#[test]
#[serial]
fn test_bad_depth_in_process_env() {
    let _guard = EnvGuard(&["RESIDUE_MAX_CALL_DEPTH"]);
    let temp_dir = TempDir::new().unwrap();

    env::set_var("RESIDUE_MAX_CALL_DEPTH", "lots");

    let result = ConfigLoader::new().load_from_directory(temp_dir.path());
    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { field, .. }) if field == "RESIDUE_MAX_CALL_DEPTH"
    ));
}

#[test]
#[serial]
fn test_env_carrier_name_is_validated() {
    let _guard = EnvGuard(&["RESIDUE_CARRIER_NAME"]);
    let temp_dir = TempDir::new().unwrap();

    env::set_var("RESIDUE_CARRIER_NAME", "not a name");

    let result = ConfigLoader::new().load_from_directory(temp_dir.path());
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}
