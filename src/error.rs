//! Error handling module for drvdeploy
//!
//! Provides centralized error handling with proper error types using thiserror.
//! An error returned from `run_deployment` or `run_init` ends the run; errors
//! raised inside the per-entry install and cache loops are logged there and
//! never returned.

use thiserror::Error;

/// Main error type for drvdeploy
#[derive(Error, Debug)]
pub enum DeployError {
    /// Catalog structure unrecognized (missing table markers)
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),

    /// Network share could not be mounted or reached
    #[error("Share unavailable: {0}")]
    ShareUnavailable(String),

    /// Expected hardware is absent from this host
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Network fetch failure for the catalog or a package
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Installer subprocess exited nonzero, or extraction failed
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// Catalog row is missing a required field
    #[error("Invalid catalog row: {0}")]
    InvalidCatalogRow(String),

    /// The device/driver query mechanism itself broke
    #[error("Inventory query failed: {0}")]
    InventoryQuery(String),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (file operations, staging tree, process spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for drvdeploy operations
pub type Result<T> = std::result::Result<T, DeployError>;

// Convenient error constructors
impl DeployError {
    /// Create a malformed catalog error
    pub fn malformed_catalog(msg: impl Into<String>) -> Self {
        Self::MalformedCatalog(msg.into())
    }

    /// Create a share unavailable error
    pub fn share_unavailable(msg: impl Into<String>) -> Self {
        Self::ShareUnavailable(msg.into())
    }

    /// Create a device not found error
    pub fn device_not_found(msg: impl Into<String>) -> Self {
        Self::DeviceNotFound(msg.into())
    }

    /// Create a download error
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    /// Create an install error
    pub fn install_failed(msg: impl Into<String>) -> Self {
        Self::InstallFailed(msg.into())
    }

    /// Create an invalid row error
    pub fn invalid_row(msg: impl Into<String>) -> Self {
        Self::InvalidCatalogRow(msg.into())
    }

    /// Create an inventory query error
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::InventoryQuery(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
