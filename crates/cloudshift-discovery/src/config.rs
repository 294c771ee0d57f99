//! Discovery configuration
//!
//! Read from `CLOUDSHIFT_*` environment variables or a YAML file and turned
//! into `ParseOptions` for a parse call.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cloudshift_types::{ParseOptions, ValidationMode};

pub const ENV_REGIONS: &str = "CLOUDSHIFT_REGIONS";
pub const ENV_IGNORE_ERRORS: &str = "CLOUDSHIFT_IGNORE_ERRORS";
pub const ENV_INCLUDE_SENSITIVE: &str = "CLOUDSHIFT_INCLUDE_SENSITIVE";
pub const ENV_MAX_CONCURRENT_SCANS: &str = "CLOUDSHIFT_MAX_CONCURRENT_SCANS";
pub const ENV_STRICT_VALIDATION: &str = "CLOUDSHIFT_STRICT_VALIDATION";
pub const ENV_CREDENTIALS_FILE: &str = "CLOUDSHIFT_CREDENTIALS_FILE";
pub const ENV_LOG_LEVEL: &str = "CLOUDSHIFT_LOG_LEVEL";

fn default_max_concurrent_scans() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Regions to scan; the first one is the default
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub ignore_errors: bool,
    #[serde(default)]
    pub include_sensitive: bool,
    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,
    /// Treat dangling dependencies as validation errors
    #[serde(default)]
    pub strict_validation: bool,
    /// Service-account key or authorized-user file for live discovery
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            ignore_errors: false,
            include_sensitive: false,
            max_concurrent_scans: default_max_concurrent_scans(),
            strict_validation: false,
            credentials_file: None,
            log_level: default_log_level(),
        }
    }
}

impl DiscoveryConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(regions) = lookup(ENV_REGIONS) {
            config.regions = regions
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup(ENV_IGNORE_ERRORS) {
            config.ignore_errors = parse_flag(ENV_IGNORE_ERRORS, &value)?;
        }
        if let Some(value) = lookup(ENV_INCLUDE_SENSITIVE) {
            config.include_sensitive = parse_flag(ENV_INCLUDE_SENSITIVE, &value)?;
        }
        if let Some(value) = lookup(ENV_STRICT_VALIDATION) {
            config.strict_validation = parse_flag(ENV_STRICT_VALIDATION, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENT_SCANS) {
            config.max_concurrent_scans = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer", ENV_MAX_CONCURRENT_SCANS))?;
        }
        if let Some(value) = lookup(ENV_CREDENTIALS_FILE) {
            config.credentials_file = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            config.log_level = value;
        }

        config.check()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.max_concurrent_scans == 0 {
            anyhow::bail!("max_concurrent_scans must be at least 1");
        }
        Ok(())
    }

    pub fn validation_mode(&self) -> ValidationMode {
        if self.strict_validation {
            ValidationMode::Strict
        } else {
            ValidationMode::Lenient
        }
    }

    /// Base parse options; filters and progress callbacks are added by the caller
    pub fn parse_options(&self) -> ParseOptions {
        let mut options = ParseOptions::default()
            .with_ignore_errors(self.ignore_errors)
            .with_include_sensitive(self.include_sensitive)
            .with_max_concurrent_scans(self.max_concurrent_scans);
        for region in &self.regions {
            options = options.with_region(region.clone());
        }
        if let Some(file) = &self.credentials_file {
            options = options.with_credential("credentials_file", file.display().to_string());
        }
        options
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} has invalid boolean value '{}'", key, other),
    }
}
