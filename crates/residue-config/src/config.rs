//! Capture Configuration (residue.toml)
//!
//! The file model keeps every field optional so layers can be merged; the
//! resolved [`CaptureConfig`] and [`RuntimeConfig`] fill in the defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Call depth limit used when nothing else is configured
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// How a function's locals are captured
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Rewrite the function body with a capture epilogue
    #[default]
    Rewrite,
    /// Observe the call through the process-wide trace hook
    Trace,
}

/// How the rewritten function receives its carrier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CarrierStyle {
    /// Leading positional parameter, supplied by the wrapper
    #[default]
    Receiver,
    /// Trailing parameter whose default is the carrier
    Keyword,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rewrite" => Ok(Strategy::Rewrite),
            "trace" => Ok(Strategy::Trace),
            other => Err(format!(
                "unknown strategy '{}' (expected 'rewrite' or 'trace')",
                other
            )),
        }
    }
}

impl FromStr for CarrierStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "receiver" => Ok(CarrierStyle::Receiver),
            "keyword" => Ok(CarrierStyle::Keyword),
            other => Err(format!(
                "unknown carrier style '{}' (expected 'receiver' or 'keyword')",
                other
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Rewrite => write!(f, "rewrite"),
            Strategy::Trace => write!(f, "trace"),
        }
    }
}

impl fmt::Display for CarrierStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarrierStyle::Receiver => write!(f, "receiver"),
            CarrierStyle::Keyword => write!(f, "keyword"),
        }
    }
}

/// Configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ResidueConfig {
    /// Capture settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureSection>,

    /// Runtime settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeSection>,
}

/// `[capture]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CaptureSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<CarrierStyle>,

    /// Overrides the convention's default parameter name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_name: Option<String>,

    /// Run the bytecode validator over rewritten functions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate: Option<bool>,
}

/// `[runtime]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RuntimeSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,
}

/// Resolved capture settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub strategy: Strategy,
    pub carrier: CarrierStyle,
    pub carrier_name: Option<String>,
    pub validate: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Rewrite,
            carrier: CarrierStyle::Receiver,
            carrier_name: None,
            validate: true,
        }
    }
}

impl CaptureConfig {
    /// Rewrite strategy with the given carrier style
    pub fn rewrite(carrier: CarrierStyle) -> Self {
        Self {
            carrier,
            ..Self::default()
        }
    }

    /// Trace strategy
    pub fn trace() -> Self {
        Self {
            strategy: Strategy::Trace,
            ..Self::default()
        }
    }
}

/// Resolved runtime settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl ResidueConfig {
    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: Path::new(crate::CONFIG_FILE_NAME).to_path_buf(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(capture) = &self.capture {
            if let Some(name) = &capture.carrier_name {
                if !is_identifier(name) {
                    return Err(ConfigError::InvalidValue {
                        field: "capture.carrier-name".to_string(),
                        reason: format!("'{}' is not a valid parameter name", name),
                    });
                }
            }
            if capture.strategy == Some(Strategy::Trace)
                && (capture.carrier.is_some() || capture.carrier_name.is_some())
            {
                return Err(ConfigError::ValidationError(
                    "carrier settings only apply to the rewrite strategy".to_string(),
                ));
            }
        }

        if let Some(runtime) = &self.runtime {
            if runtime.max_call_depth == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "runtime.max-call-depth".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Merge another config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ResidueConfig) {
        if let Some(theirs) = &other.capture {
            let ours = self.capture.get_or_insert_with(Default::default);
            if theirs.strategy.is_some() {
                ours.strategy = theirs.strategy;
            }
            if theirs.carrier.is_some() {
                ours.carrier = theirs.carrier;
            }
            if theirs.carrier_name.is_some() {
                ours.carrier_name = theirs.carrier_name.clone();
            }
            if theirs.validate.is_some() {
                ours.validate = theirs.validate;
            }
        }
        if let Some(theirs) = &other.runtime {
            let ours = self.runtime.get_or_insert_with(Default::default);
            if theirs.max_call_depth.is_some() {
                ours.max_call_depth = theirs.max_call_depth;
            }
        }
    }

    /// Capture settings with defaults filled in
    pub fn capture(&self) -> CaptureConfig {
        let defaults = CaptureConfig::default();
        match &self.capture {
            Some(section) => CaptureConfig {
                strategy: section.strategy.unwrap_or(defaults.strategy),
                carrier: section.carrier.unwrap_or(defaults.carrier),
                carrier_name: section.carrier_name.clone(),
                validate: section.validate.unwrap_or(defaults.validate),
            },
            None => defaults,
        }
    }

    /// Runtime settings with defaults filled in
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_call_depth: self
                .runtime
                .as_ref()
                .and_then(|r| r.max_call_depth)
                .unwrap_or(DEFAULT_MAX_CALL_DEPTH),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
