//! Configuration file handling.
//!
//! This module provides loading and saving of compscan configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/compscan/config.toml`
//! - macOS: `~/Library/Application Support/compscan/config.toml`
//! - Windows: `%APPDATA%\compscan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! detector_categories = ["Npm", "Pip"]
//! directory_exclusion_list = ["**/node_modules/**", "**/target/**"]
//! experimental_timeout_secs = 240
//! max_threads = 5
//! dev_dependency_merge = "production-wins"
//! default_format = "table"
//! log_level = "info"
//! log_format = "compact"
//!
//! [detector_args]
//! Pip = "EnableIfDefaultOff"
//!
//! [ignore]
//! components = ["internal-*"]
//! ```

use crate::error::DetectionError;
use crate::model::DevDependencyMergeRule;
use crate::orchestrator::DetectionArguments;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
///
/// Every field has a default, so a partial file is valid. Command-line
/// flags override what is loaded here.
///
/// # Example
///
/// ```no_run
/// use compscan::Config;
///
/// let config = Config::load().unwrap();
/// println!("Max threads: {}", config.max_threads);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detector categories to run. Empty means every category.
    pub detector_categories: Vec<String>,

    /// Detector ids to run. Empty means every detector.
    pub detectors_filter: Vec<String>,

    /// Glob patterns of directories that are never walked.
    pub directory_exclusion_list: Vec<String>,

    /// Time budget for experimental detectors, in seconds.
    ///
    /// Default: 240
    pub experimental_timeout_secs: u64,

    /// Maximum number of manifests a detector processes concurrently.
    ///
    /// Default: 5
    pub max_threads: usize,

    /// How conflicting development-dependency flags are resolved.
    ///
    /// Default: "production-wins"
    pub dev_dependency_merge: DevDependencyMergeRule,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Log level used when `RUST_LOG` is not set.
    ///
    /// Default: "info"
    pub log_level: String,

    /// Log output format: "pretty", "compact" or "json".
    ///
    /// Default: "compact"
    pub log_format: String,

    /// Optional file that receives telemetry records as JSON lines.
    pub telemetry_file: Option<PathBuf>,

    /// Per-detector arguments, e.g. `Pip = "EnableIfDefaultOff"`.
    pub detector_args: BTreeMap<String, String>,

    /// Components removed from the scan output.
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Configuration for suppressing components from the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Component ids to drop from results.
    ///
    /// Supports `*` wildcards (e.g., "internal-*", "* - Pip").
    pub components: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a component should be ignored.
    pub fn should_ignore_component(&self, component_id: &str) -> bool {
        crate::pattern::matches_any(&self.components, component_id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detector_categories: Vec::new(),
            detectors_filter: Vec::new(),
            detector_args: BTreeMap::new(),
            directory_exclusion_list: Vec::new(),
            experimental_timeout_secs: crate::orchestrator::DEFAULT_EXPERIMENTAL_TIMEOUT.as_secs(),
            max_threads: crate::orchestrator::DEFAULT_MAX_THREADS,
            dev_dependency_merge: DevDependencyMergeRule::default(),
            default_format: "table".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            telemetry_file: None,
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`, falling back to defaults when the file
    /// is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::Config`] if the file cannot be read or parsed,
    /// or if it holds values no scan could run with.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| DetectionError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| DetectionError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if config.max_threads == 0 {
            return Err(DetectionError::Config {
                path: path.to_path_buf(),
                reason: "max_threads must be at least 1".to_string(),
            }
            .into());
        }

        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Saves the configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use compscan::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("compscan")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Scan arguments for `source_directory` seeded from this configuration.
    pub fn detection_arguments(&self, source_directory: impl Into<PathBuf>) -> DetectionArguments {
        let mut args = DetectionArguments::new(source_directory);
        args.detector_args = self.detector_args.clone();
        args.directory_exclusion_list = self.directory_exclusion_list.clone();
        args.detector_categories = self.detector_categories.clone();
        args.detectors_filter = self.detectors_filter.clone();
        args.max_threads = self.max_threads;
        args.experimental_timeout = Duration::from_secs(self.experimental_timeout_secs);
        args.dev_dependency_merge = self.dev_dependency_merge;
        args.ignored_components = self.ignore.components.clone();
        args
    }
}
