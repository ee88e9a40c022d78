//! Configuration Management
//!
//! Handles persistent configuration storage for tinv.

use crate::discovery::filter::FilterConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default wall-clock budget of a run
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

/// Region used when none is configured anywhere
pub const DEFAULT_REGION: &str = "us-ashburn-1";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Tenancy OCID
    #[serde(default)]
    pub tenancy_id: Option<String>,
    /// Region identifier, e.g. `eu-frankfurt-1`
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint template with `{service}` and `{region}` placeholders
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Compartments processed simultaneously
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Run deadline in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retries after the first attempt of a transient failure
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Default filters, merged with CLI filters
    #[serde(default)]
    pub filters: FilterConfig,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tinv").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective tenancy (config > environment/profile)
    pub fn effective_tenancy(&self) -> String {
        self.tenancy_id
            .clone()
            .or_else(crate::api::profile::get_default_tenancy)
            .unwrap_or_default()
    }

    /// Get effective region (config > environment/profile > default)
    pub fn effective_region(&self) -> String {
        self.region
            .clone()
            .or_else(crate::api::profile::get_default_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    pub fn effective_timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}
