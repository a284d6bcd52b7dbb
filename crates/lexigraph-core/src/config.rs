use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EngineError;
use crate::model::ENGINE_PROVENANCE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub augment: AugmentConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum issues emitted to the caller's sink; -1 means unlimited.
    #[serde(default = "default_log_limit")]
    pub log_limit: i64,
    #[serde(default)]
    pub fail_fast: bool,
    /// Missing external references are errors instead of warnings.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_known_prefixes")]
    pub known_prefixes: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            log_limit: default_log_limit(),
            fail_fast: false,
            strict: false,
            known_prefixes: default_known_prefixes(),
        }
    }
}

impl ValidationConfig {
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] when `log_limit < -1`.
    pub fn limit(&self) -> Result<LogLimit, EngineError> {
        match self.log_limit {
            -1 => Ok(LogLimit::Unlimited),
            n => usize::try_from(n).map(LogLimit::Cap).map_err(|_| {
                EngineError::InvalidConfig(format!("log_limit must be -1 or greater, got {n}"))
            }),
        }
    }
}

/// Cap on issues emitted to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLimit {
    Unlimited,
    Cap(usize),
}

impl LogLimit {
    #[must_use]
    pub const fn allows(self, emitted: usize) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Cap(cap) => emitted < cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Nodes processed between flush/clear-cache cycles.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Provenance stamped on engine-created edges.
    #[serde(default = "default_provenance")]
    pub provenance: String,
    #[serde(default = "default_root_domain")]
    pub root_domain: String,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            provenance: default_provenance(),
            root_domain: default_root_domain(),
        }
    }
}

impl EngineConfig {
    /// Check value ranges the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for a zero batch size, a log
    /// limit below -1, or an empty provenance or root domain.
    pub fn validated(self) -> Result<Self, EngineError> {
        self.validation.limit()?;
        if self.augment.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.augment.provenance.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "provenance must not be empty".to_string(),
            ));
        }
        if self.augment.root_domain.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "root_domain must not be empty".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Parse an engine config from TOML text and check its ranges.
///
/// # Errors
///
/// Fails on TOML syntax errors or out-of-range values.
pub fn parse_config(text: &str) -> Result<EngineConfig> {
    let config = toml::from_str::<EngineConfig>(text).context("Failed to parse engine config")?;
    Ok(config.validated()?)
}

/// Load an engine config file. A missing file yields the defaults.
///
/// # Errors
///
/// Fails when the file exists but cannot be read, parsed, or validated.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to load {}", path.display()))
}

const fn default_log_limit() -> i64 {
    -1
}

const fn default_batch_size() -> usize {
    1000
}

fn default_provenance() -> String {
    ENGINE_PROVENANCE.to_string()
}

fn default_root_domain() -> String {
    "lexigraph_domain".to_string()
}

fn default_known_prefixes() -> Vec<String> {
    ["ili", "pwn", "oewn"].map(str::to_string).to_vec()
}
