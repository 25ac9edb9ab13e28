//! Residue Configuration System
//!
//! Provides configuration for locals capture:
//! - Capture settings (strategy, carrier convention, carrier name)
//! - Runtime settings (call depth limit)
//! - Configuration precedence and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Project config (./residue.toml, found by walking up from a directory)
//! 3. Environment variables (RESIDUE_*)
//!
//! # Example
//!
//! ```no_run
//! use residue_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let loaded = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("{:?}", loaded.capture().strategy);
//! ```

pub mod config;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use config::{
    CaptureConfig, CaptureSection, CarrierStyle, ResidueConfig, RuntimeConfig, RuntimeSection,
    Strategy, DEFAULT_MAX_CALL_DEPTH,
};
pub use loader::{ConfigLoader, LoadedConfig, CONFIG_FILE_NAME};
