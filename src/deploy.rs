//! Run orchestration
//!
//! Wires the components together for the default run and `init` mode:
//!
//! ```text
//! run:  mount share → parse catalog → machine identity → reconcile → install → unmount
//! init: fetch catalog → parse → write <cache>/pilotes.md → download packages into <cache>/drivers
//! ```
//!
//! The share is held by a `ShareGuard`, so it is released on every path out
//! of `run_deployment`, including errors.

use crate::cache::{CacheReport, build_cache};
use crate::catalog;
use crate::config::DeployConfig;
use crate::error::Result;
use crate::installer::{InstallReport, PackageInstaller};
use crate::inventory::HostInventory;
use crate::platform::{Fetcher, PackageRuntime, ShareMounter};
use crate::reconcile::{ReconcileSummary, install_list, reconcile};
use crate::share::ShareGuard;
use crate::types::{InstallAction, InstallDecision, MachineIdentity};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// The external collaborators a run needs.
pub struct Collaborators<'a> {
    pub mounter: &'a dyn ShareMounter,
    pub inventory: &'a dyn HostInventory,
    pub runtime: &'a dyn PackageRuntime,
    pub fetcher: &'a dyn Fetcher,
}

/// Everything a default run decided and did.
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub machine: MachineIdentity,
    pub decisions: Vec<InstallDecision>,
    /// `None` on a dry run or when nothing needed installing
    pub install: Option<InstallReport>,
}

impl DeployReport {
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary::from_decisions(&self.decisions)
    }

    /// Whether any part of the install batch failed.
    pub fn has_failures(&self) -> bool {
        self.install
            .as_ref()
            .is_some_and(|r| r.failures() > 0 || r.bulk_failed())
    }
}

/// Reconcile this host against the distribution catalog and install what is
/// missing or outdated.
///
/// # Errors
///
/// Fatal only: invalid configuration, share unavailable, catalog unreadable or
/// malformed, machine identity unavailable. Per-entry failures are in the
/// returned report.
pub fn run_deployment(
    config: &DeployConfig,
    deps: &Collaborators<'_>,
    dry_run: bool,
) -> Result<DeployReport> {
    config.validate_for_run()?;

    let share = ShareGuard::acquire(deps.mounter, &config.distribution_path, &config.credentials)?;

    let catalog_path = config.catalog_path(share.root());
    info!("Loading catalog {}", catalog_path.display());
    let entries = catalog::load_catalog_file(&catalog_path)?;
    info!("Catalog has {} entries", entries.len());

    let machine = deps.inventory.machine_identity()?;
    let mut decisions = reconcile(&entries, &machine, deps.inventory);
    info!("Reconciliation: {}", ReconcileSummary::from_decisions(&decisions));

    let pending = install_list(&decisions).len();
    let install = if dry_run {
        info!("Dry run: {} package(s) would be installed", pending);
        None
    } else if pending == 0 {
        info!("All applicable drivers are current");
        None
    } else {
        let installer = PackageInstaller::new(deps.runtime, deps.fetcher)
            .with_package_dir(config.drivers_path(share.root()));
        let report = installer.install_all(&mut decisions, &config.staging_dir)?;
        info!(
            "Install batch finished: {} entries, {} failed, driver store: {:?}",
            report.entries.len(),
            report.failures(),
            report.bulk
        );
        Some(report)
    };

    drop(share);
    Ok(DeployReport { machine, decisions, install })
}

/// Populate the local cache (`init` mode) from the published catalog.
///
/// The fetched document is saved as `<cache>/<catalog file>` and packages go
/// to `<cache>/<drivers dir>`, so the cache is itself a distribution root.
pub fn run_init(config: &DeployConfig, fetcher: &dyn Fetcher) -> Result<CacheReport> {
    config.validate_for_init()?;

    info!("Fetching catalog {}", config.catalog_url);
    let document = fetcher.fetch_text(&config.catalog_url)?;
    let entries = catalog::parse(&document)?;
    info!("Catalog has {} entries", entries.len());

    fs::create_dir_all(&config.cache_dir)?;
    let catalog_copy: PathBuf = config.catalog_path(&config.cache_dir);
    fs::write(&catalog_copy, &document)?;
    info!("Saved catalog to {}", catalog_copy.display());

    build_cache(&entries, config.use_mirror, &config.drivers_path(&config.cache_dir), fetcher)
}

/// Render decisions as a console table.
pub fn format_decisions(decisions: &[InstallDecision]) -> String {
    let mut lines = vec![format!(
        "{:<24} {:<40} {:<36} {}",
        "ACTION", "HARDWARE ID", "CATALOG", "INSTALLED"
    )];
    for d in decisions {
        if d.action == InstallAction::SkipModelMismatch && d.entry.model.trim().is_empty() {
            lines.push(format!("{:<24} {:<40} (invalid row)", d.action.to_string(), d.entry.hardware_id));
            continue;
        }
        lines.push(format!(
            "{:<24} {:<40} {:<36} {}",
            d.action.to_string(),
            d.entry.hardware_id,
            d.entry.driver_signature,
            d.installed.as_ref().map_or("-", |s| s.as_str())
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DriverEntry, Signature};

    #[test]
    fn test_format_decisions() {
        let decisions = vec![
            InstallDecision {
                entry: DriverEntry {
                    model: "ANY".into(),
                    hardware_id: "PCI\\VEN_10DE".into(),
                    driver_signature: "NVIDIA - Display - 1.0".into(),
                    ..Default::default()
                },
                action: InstallAction::Install,
                installed: Some(Signature::new("NVIDIA - Display - 0.9")),
            },
            InstallDecision {
                entry: DriverEntry { hardware_id: "USB\\VID_1".into(), ..Default::default() },
                action: InstallAction::SkipModelMismatch,
                installed: None,
            },
        ];
        let table = format_decisions(&decisions);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("INSTALL"));
        assert!(lines[1].ends_with("NVIDIA - Display - 0.9"));
        assert!(lines[2].contains("(invalid row)"));
    }
}
