//! drvdeploy Library
//!
//! Keeps a Windows host's device drivers in line with a shared markdown
//! catalog: parse the catalog, compare it with what the host has installed,
//! then stage and install the missing or outdated packages.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod hardware_id;
pub mod installer;
pub mod installer_args;
pub mod inventory;
pub mod platform;
pub mod process;
pub mod reconcile;
pub mod run_marker;
pub mod search;
pub mod share;
pub mod types;

// Re-export main types for convenience
pub use config::DeployConfig;
pub use error::{DeployError, Result};
pub use types::{
    Credentials, DriverEntry, InstallAction, InstallDecision, MachineIdentity, OnlineFlag,
    Signature,
};

pub use cache::{CacheReport, build_cache};
pub use catalog::{load_catalog_file, parse as parse_catalog};
pub use deploy::{Collaborators, DeployReport, run_deployment, run_init};
pub use hardware_id::normalize_hardware_id;
pub use installer::{InstallReport, PackageInstaller};
pub use installer_args::InstallerArgs;
pub use inventory::{DeviceFilter, DeviceRecord, HostInventory};
pub use platform::{Fetcher, PackageRuntime, ShareMounter};
pub use reconcile::{ReconcileSummary, reconcile};
pub use search::{CatalogHit, scan_problem_devices, search_catalog};
pub use share::ShareGuard;
