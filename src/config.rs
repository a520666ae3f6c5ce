//! Engine configuration.
//!
//! The engine never reads configuration on its own; the binary loads an
//! [`EngineConfig`] (from a JSON file, or the defaults) and hands it to the
//! [`Analyser`](crate::analyser::Analyser).

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Limits and defaults consumed by the analysis engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of datasets held at once
    pub max_datasets: usize,
    /// Maximum number of rows accepted by a single load
    pub max_rows_per_load: usize,
    /// Threshold used when a correlation call does not give one
    pub default_correlation_threshold: f64,
    /// Longest accepted dataset name, in characters
    pub max_name_length: usize,
    /// Delimiter used when a CSV load does not give one
    pub csv_delimiter: char,
    /// Maximum number of rows rendered in an HTML dataset export
    pub html_row_limit: usize,
    /// Directories the binary's file-access layer may read and write
    pub trusted_roots: Vec<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_datasets: 64,
            max_rows_per_load: 1_000_000,
            default_correlation_threshold: 0.5,
            max_name_length: 128,
            csv_delimiter: ',',
            html_row_limit: 500,
            trusted_roots: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;

        let config: Self =
            serde_json::from_str(&contents).context("Failed to parse engine config JSON")?;
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize engine config")?;

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write engine config to {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_datasets == 0 {
            anyhow::bail!("max_datasets must be at least 1");
        }
        if self.max_rows_per_load == 0 {
            anyhow::bail!("max_rows_per_load must be at least 1");
        }
        if self.max_name_length == 0 {
            anyhow::bail!("max_name_length must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.default_correlation_threshold) {
            anyhow::bail!(
                "default_correlation_threshold must be within [0, 1], got {}",
                self.default_correlation_threshold
            );
        }
        if !self.csv_delimiter.is_ascii() {
            anyhow::bail!("csv_delimiter must be a single ASCII character");
        }
        Ok(())
    }

    pub(crate) fn csv_delimiter_byte(&self) -> u8 {
        u8::try_from(self.csv_delimiter).unwrap_or(b',')
    }
}
