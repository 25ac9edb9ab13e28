//! Configuration Loader
//!
//! Handles finding residue.toml and layering environment overrides on top.

use crate::config::{
    CaptureConfig, CaptureSection, CarrierStyle, ResidueConfig, RuntimeConfig, RuntimeSection,
    Strategy,
};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "residue.toml";

/// Configuration loader
///
/// Loads configuration with the following precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Project config (residue.toml) - overrides defaults
/// 3. Environment variables (RESIDUE_*) - overrides project
pub struct ConfigLoader {
    /// Reads environment variables; swapped out in tests
    lookup: Box<dyn Fn(&str) -> Option<String>>,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Merged configuration
    pub config: ResidueConfig,

    /// Directory where residue.toml was found
    pub root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader that reads the process environment
    pub fn new() -> Self {
        Self::with_env(|key| env::var(key).ok())
    }

    /// Create a loader with a custom environment lookup
    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find residue.toml. A missing file is
    /// not an error; defaults and environment overrides still apply.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let (root, config) = self.find_config(start_dir)?;
        let config = self.apply_env_overrides(config)?;
        Ok(LoadedConfig { config, root })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        let config = ResidueConfig::load_from_file(config_path)?;
        let config = self.apply_env_overrides(config)?;
        let root = config_path.parent().map(|p| p.to_path_buf());
        Ok(LoadedConfig { config, root })
    }

    /// Find residue.toml by walking up the directory tree
    fn find_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, ResidueConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = ResidueConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ResidueConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Recognized: RESIDUE_STRATEGY, RESIDUE_CARRIER, RESIDUE_CARRIER_NAME,
    /// RESIDUE_VALIDATE, RESIDUE_MAX_CALL_DEPTH
    pub fn apply_env_overrides(&self, config: ResidueConfig) -> ConfigResult<ResidueConfig> {
        let mut capture = CaptureSection::default();
        let mut runtime = RuntimeSection::default();

        if let Some(value) = (self.lookup)("RESIDUE_STRATEGY") {
            let parsed = value
                .parse::<Strategy>()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: "RESIDUE_STRATEGY".to_string(),
                    reason,
                })?;
            capture.strategy = Some(parsed);
        }

        if let Some(value) = (self.lookup)("RESIDUE_CARRIER") {
            let parsed = value
                .parse::<CarrierStyle>()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: "RESIDUE_CARRIER".to_string(),
                    reason,
                })?;
            capture.carrier = Some(parsed);
        }

        if let Some(value) = (self.lookup)("RESIDUE_CARRIER_NAME") {
            capture.carrier_name = Some(value);
        }

        if let Some(value) = (self.lookup)("RESIDUE_VALIDATE") {
            capture.validate = Some(matches!(
                value.to_lowercase().as_str(),
                "true" | "1" | "yes"
            ));
        }

        if let Some(value) = (self.lookup)("RESIDUE_MAX_CALL_DEPTH") {
            let depth = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "RESIDUE_MAX_CALL_DEPTH".to_string(),
                    reason: e.to_string(),
                })?;
            runtime.max_call_depth = Some(depth);
        }

        let mut merged = config;
        merged.merge(&ResidueConfig {
            capture: Some(capture),
            runtime: Some(runtime),
        });
        merged.validate()?;
        Ok(merged)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadedConfig {
    /// Effective capture settings
    pub fn capture(&self) -> CaptureConfig {
        self.config.capture()
    }

    /// Effective runtime settings
    pub fn runtime(&self) -> RuntimeConfig {
        self.config.runtime()
    }

    /// Directory holding residue.toml
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Check if a residue.toml was found
    pub fn is_project(&self) -> bool {
        self.root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn loader_with(vars: &[(&str, &str)]) -> ConfigLoader {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigLoader::with_env(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[capture]\nstrategy = \"trace\"\n",
        )
        .unwrap();
        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let loaded = loader_with(&[]).load_from_directory(&sub_dir).unwrap();

        assert_eq!(loaded.capture().strategy, Strategy::Trace);
        assert_eq!(loaded.root(), Some(temp_dir.path()));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[capture]\ncarrier = \"receiver\"\n[runtime]\nmax-call-depth = 8\n",
        )
        .unwrap();

        let loaded = loader_with(&[
            ("RESIDUE_CARRIER", "keyword"),
            ("RESIDUE_MAX_CALL_DEPTH", "32"),
        ])
        .load_from_directory(temp_dir.path())
        .unwrap();

        assert_eq!(loaded.capture().carrier, CarrierStyle::Keyword);
        assert_eq!(loaded.runtime().max_call_depth, 32);
    }

    #[test]
    fn test_invalid_env_value() {
        let temp_dir = TempDir::new().unwrap();
        let result = loader_with(&[("RESIDUE_STRATEGY", "inline")])
            .load_from_directory(temp_dir.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "RESIDUE_STRATEGY"
        ));
    }
}
