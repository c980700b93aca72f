//! Settings
//!
//! Optional `azperm.toml` in the working directory (or `--config <path>`):
//!
//! ```toml
//! [api]
//! api_version = "2022-04-01"
//! management_endpoint = "https://management.usgovcloudapi.net"
//!
//! [cache]
//! path = "permissions.json"
//! enabled = true
//!
//! [matcher]
//! max_segments_from_end = 2
//! min_depth = 1
//! exclude_monitoring = true
//! monitoring_keywords = ["monitor", "metric", "diagnostic"]
//! ```
//!
//! Precedence: command-line flags, then `AZPERM_*` environment variables,
//! then the file, then defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_FILE;
use crate::error::AzpermError;
use crate::provider::client::DEFAULT_API_VERSION;
use crate::resolve::MatchPolicy;

/// Default settings file name, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "azperm.toml";

/// Overrides the provider operations API version
pub const API_VERSION_ENV: &str = "AZPERM_API_VERSION";

/// Overrides the management endpoint
pub const ENDPOINT_ENV: &str = "AZPERM_MANAGEMENT_ENDPOINT";

/// `[api]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Provider operations API version
    pub api_version: Option<String>,
    /// Management endpoint; discovered from the Azure CLI when unset
    pub management_endpoint: Option<String>,
}

/// `[cache]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file location
    pub path: PathBuf,
    /// When false the cache is kept in memory only
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CACHE_FILE),
            enabled: true,
        }
    }
}

/// All settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// API settings
    pub api: ApiConfig,
    /// Cache settings
    pub cache: CacheConfig,
    /// Data-plane matching thresholds
    pub matcher: MatchPolicy,
}

impl Settings {
    /// Parse a settings file from a path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse settings from a string
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).context("Failed to parse azperm.toml")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path` if it exists, otherwise defaults. A file that exists but
    /// does not parse is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides. `lookup` is usually `std::env::var(..).ok()`.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(version) = non_empty(API_VERSION_ENV) {
            self.api.api_version = Some(version);
        }
        if let Some(endpoint) = non_empty(ENDPOINT_ENV) {
            self.api.management_endpoint = Some(endpoint);
        }
        self
    }

    /// Effective API version
    #[must_use]
    pub fn api_version(&self) -> &str {
        self.api.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.matcher.max_segments_from_end == 0 {
            return Err(AzpermError::Config(
                "matcher.max_segments_from_end must be at least 1".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.path.as_os_str().is_empty() {
            return Err(AzpermError::Config("cache.path must not be empty".to_string()));
        }
        Ok(())
    }
}
