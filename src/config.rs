//! Deployment configuration
//!
//! One immutable `DeployConfig` is built at start-up and passed by reference
//! into every component. Precedence, lowest first: defaults → JSON config
//! file → environment → command-line flags (the last two merged by clap).

use crate::error::{DeployError, Result};
use crate::types::Credentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default catalog file name inside a distribution root.
pub const DEFAULT_CATALOG_FILE: &str = "pilotes.md";
/// Default package directory name inside a distribution root.
pub const DEFAULT_DRIVERS_DIR: &str = "drivers";

/// Runtime configuration for every mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// UNC share or local directory holding the catalog and packages
    pub distribution_path: String,
    pub credentials: Credentials,
    /// Published catalog document, fetched by `init`
    pub catalog_url: String,
    /// Prefer mirror URLs when populating the cache
    pub use_mirror: bool,
    /// Ignore the run marker
    pub force: bool,
    /// Run log, also the "already ran" marker
    pub log_file: PathBuf,
    /// Per-run working directory, deleted after install
    pub staging_dir: PathBuf,
    /// Local cache populated by `init`
    pub cache_dir: PathBuf,
    pub catalog_file_name: String,
    pub drivers_dir_name: String,
    pub http_timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            distribution_path: String::new(),
            credentials: Credentials::default(),
            catalog_url: String::new(),
            use_mirror: false,
            force: false,
            log_file: default_data_dir().join("drvdeploy.log"),
            staging_dir: std::env::temp_dir().join("drvdeploy-staging"),
            cache_dir: default_data_dir().join("cache"),
            catalog_file_name: DEFAULT_CATALOG_FILE.to_string(),
            drivers_dir_name: DEFAULT_DRIVERS_DIR.to_string(),
            http_timeout_secs: 300,
        }
    }
}

/// `%ProgramData%\drvdeploy`, or the temp dir when ProgramData is unset.
fn default_data_dir() -> PathBuf {
    std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("drvdeploy")
}

impl DeployConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            DeployError::config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file. The share password is not written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Checks shared by every mode.
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            return Err(DeployError::config("http_timeout_secs must be greater than zero"));
        }
        if self.catalog_file_name.trim().is_empty() || self.drivers_dir_name.trim().is_empty() {
            return Err(DeployError::config("catalog and drivers names must not be empty"));
        }
        Ok(())
    }

    /// Checks for the default reconcile-and-install run.
    pub fn validate_for_run(&self) -> Result<()> {
        self.validate()?;
        if self.distribution_path.trim().is_empty() {
            return Err(DeployError::config("distribution path must be specified"));
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(DeployError::config("staging directory must be specified"));
        }
        Ok(())
    }

    /// Checks for `init` mode.
    pub fn validate_for_init(&self) -> Result<()> {
        self.validate()?;
        let url = self.catalog_url.trim();
        if url.is_empty() {
            return Err(DeployError::config("catalog URL must be specified for init"));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DeployError::config("catalog URL must start with http:// or https://"));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// `<root>/<catalog file>`
    pub fn catalog_path(&self, root: &Path) -> PathBuf {
        root.join(&self.catalog_file_name)
    }

    /// `<root>/<drivers dir>`
    pub fn drivers_path(&self, root: &Path) -> PathBuf {
        root.join(&self.drivers_dir_name)
    }
}
