//! Package Installer
//!
//! Stages each decided-to-install package, runs the procedure its rule
//! selects, then installs every staged INF into the driver store in one pass.
//!
//! # Procedure Table
//!
//! Rules are tried in order; the first match wins:
//!
//! | Rule                 | Signature contains                         | File     | Procedure |
//! |----------------------|--------------------------------------------|----------|-----------|
//! | `nvidia-display-exe` | `NVIDIA - Display`                         | `*.exe`  | silent install, no reboot |
//! | `amd-display-exe`    | `Advanced Micro Devices, Inc. - Display`   | `*.exe`  | self-extract/install (+ legacy Setup.exe reinstall) |
//! | `cab-extract`        | anything                                   | anything | expand into `<staging>/<stem>/` |
//!
//! New vendor rules are added to `INSTALL_RULES`, not as further branching.
//!
//! # Failure Isolation
//!
//! A failing entry (download, copy, extract, installer exit code) is logged
//! and the batch continues. The bulk driver-store pass runs once at the end;
//! its failure is reported, not retried.

use crate::error::{DeployError, Result};
use crate::hardware_id::{package_extension, package_file_name};
use crate::installer_args::{
    AmdPackageArgs, AmdSetupArgs, AmdSetupMode, NvidiaSilentArgs, PnpUtilAddDriverArgs,
};
use crate::platform::{Fetcher, PackageRuntime, run_installer_args};
use crate::types::{DriverEntry, InstallAction, InstallDecision};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Signature fragment identifying NVIDIA display drivers.
pub const NVIDIA_DISPLAY: &str = "NVIDIA - Display";
/// Signature fragment identifying AMD display drivers.
pub const AMD_DISPLAY: &str = "Advanced Micro Devices, Inc. - Display";
/// AMD package name prefixes whose contents must be reinstalled through the
/// nested Setup.exe (these packages do not register themselves).
pub const AMD_LEGACY_PREFIXES: &[&str] = &["win10-64bit-radeon-software-", "radeon-crimson-"];
/// Fixed directory AMD self-extracting packages unpack into.
pub const AMD_EXTRACT_DIR: &str = "C:\\AMD";

// ============================================================================
// Dispatch table
// ============================================================================

/// How a staged package is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallProcedure {
    NvidiaSilent,
    AmdSelfExtract,
    CabExtract,
}

impl fmt::Display for InstallProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NvidiaSilent => write!(f, "NVIDIA silent install"),
            Self::AmdSelfExtract => write!(f, "AMD self-extract"),
            Self::CabExtract => write!(f, "cab extract"),
        }
    }
}

/// One `(predicate, procedure)` pair of the dispatch table.
pub struct InstallRule {
    pub name: &'static str,
    pub procedure: InstallProcedure,
    matches: fn(&DriverEntry, &str) -> bool,
}

impl InstallRule {
    pub fn matches(&self, entry: &DriverEntry, file_name: &str) -> bool {
        (self.matches)(entry, file_name)
    }
}

fn is_exe(file_name: &str) -> bool {
    package_extension(file_name).as_deref() == Some("exe")
}

fn nvidia_display_exe(entry: &DriverEntry, file_name: &str) -> bool {
    entry.driver_signature.contains(NVIDIA_DISPLAY) && is_exe(file_name)
}

fn amd_display_exe(entry: &DriverEntry, file_name: &str) -> bool {
    entry.driver_signature.contains(AMD_DISPLAY) && is_exe(file_name)
}

fn any_package(_entry: &DriverEntry, _file_name: &str) -> bool {
    true
}

/// Ordered dispatch table. The last rule always matches.
pub const INSTALL_RULES: &[InstallRule] = &[
    InstallRule {
        name: "nvidia-display-exe",
        procedure: InstallProcedure::NvidiaSilent,
        matches: nvidia_display_exe,
    },
    InstallRule {
        name: "amd-display-exe",
        procedure: InstallProcedure::AmdSelfExtract,
        matches: amd_display_exe,
    },
    InstallRule {
        name: "cab-extract",
        procedure: InstallProcedure::CabExtract,
        matches: any_package,
    },
];

/// Pick the first rule matching the entry and staged filename.
pub fn select_rule(entry: &DriverEntry, file_name: &str) -> &'static InstallRule {
    INSTALL_RULES
        .iter()
        .find(|rule| rule.matches(entry, file_name))
        .unwrap_or(&INSTALL_RULES[INSTALL_RULES.len() - 1])
}

/// Whether an AMD package name marks a legacy package.
pub fn is_amd_legacy_package(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    AMD_LEGACY_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

// ============================================================================
// Staging
// ============================================================================

/// Per-run local working directory, exclusively owned by this process.
#[derive(Debug)]
pub struct Staging {
    root: PathBuf,
    staged: HashSet<String>,
}

impl Staging {
    /// Create the staging directory, tolerating pre-existing state.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self { root: root.to_path_buf(), staged: HashSet::new() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a package with this filename was already staged this run.
    pub fn is_staged(&self, file_name: &str) -> bool {
        self.staged.contains(&file_name.to_ascii_lowercase())
    }

    fn mark_staged(&mut self, file_name: &str) {
        self.staged.insert(file_name.to_ascii_lowercase());
    }

    /// Every `*.inf` under the staging tree.
    pub fn inf_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("inf"))
            })
            .map(|e| e.into_path())
            .collect()
    }

    /// Delete the staging tree.
    pub fn remove(self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

// ============================================================================
// Reports
// ============================================================================

/// What happened to one entry handed to the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Vendor installer ran to success
    Installed,
    /// Archive expanded; the bulk pass installs it
    Extracted,
    /// Same package filename already staged this run
    SkippedDuplicate,
    Failed(String),
}

/// Result of the final driver-store pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    /// No INF files were staged
    NothingToInstall,
    Installed { inf_count: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub hardware_id: String,
    pub file_name: Option<String>,
    pub procedure: Option<InstallProcedure>,
    pub outcome: InstallOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub entries: Vec<EntryReport>,
    pub bulk: BulkOutcome,
}

impl InstallReport {
    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, InstallOutcome::Failed(_)))
            .count()
    }

    pub fn bulk_failed(&self) -> bool {
        matches!(self.bulk, BulkOutcome::Failed(_))
    }
}

// ============================================================================
// Installer
// ============================================================================

/// Drives package staging and installation for one run.
pub struct PackageInstaller<'a> {
    runtime: &'a dyn PackageRuntime,
    fetcher: &'a dyn Fetcher,
    /// `<distribution root>/drivers`, checked before downloading
    package_dir: Option<PathBuf>,
    amd_extract_dir: PathBuf,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(runtime: &'a dyn PackageRuntime, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            runtime,
            fetcher,
            package_dir: None,
            amd_extract_dir: PathBuf::from(AMD_EXTRACT_DIR),
        }
    }

    /// Copy packages from this directory when they are present there.
    pub fn with_package_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.package_dir = Some(dir.into());
        self
    }

    /// Override the AMD extraction directory.
    pub fn with_amd_extract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.amd_extract_dir = dir.into();
        self
    }

    /// Install every `Install` decision, then run the bulk driver-store pass
    /// and delete the staging tree.
    ///
    /// Decisions whose package was already staged are downgraded to
    /// `SkipDuplicateStaged` in place.
    pub fn install_all(&self, decisions: &mut [InstallDecision], staging_root: &Path) -> Result<InstallReport> {
        let mut staging = Staging::create(staging_root)?;
        let mut entries = Vec::new();

        for decision in decisions.iter_mut().filter(|d| d.action.is_install()) {
            let file_name = package_file_name(&decision.entry.download_url);
            let procedure = file_name
                .as_deref()
                .map(|f| select_rule(&decision.entry, f).procedure);

            let outcome = match self.install(&decision.entry, &mut staging) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{}: {}", decision.entry.hardware_id, e);
                    InstallOutcome::Failed(e.to_string())
                }
            };

            if outcome == InstallOutcome::SkippedDuplicate {
                decision.action = InstallAction::SkipDuplicateStaged;
            }

            entries.push(EntryReport {
                hardware_id: decision.entry.hardware_id.clone(),
                file_name,
                procedure,
                outcome,
            });
        }

        let bulk = self.install_staged_infs(&staging);

        if let Err(e) = staging.remove() {
            warn!("Failed to remove staging directory {}: {}", staging_root.display(), e);
        }

        Ok(InstallReport { entries, bulk })
    }

    /// Stage one entry's package and run its install procedure.
    pub fn install(&self, entry: &DriverEntry, staging: &mut Staging) -> Result<InstallOutcome> {
        let file_name = package_file_name(&entry.download_url).ok_or_else(|| {
            DeployError::download_failed(format!(
                "{}: no package filename in URL '{}'",
                entry.hardware_id, entry.download_url
            ))
        })?;

        if staging.is_staged(&file_name) {
            info!("{}: {} already staged, skipping duplicate", entry.hardware_id, file_name);
            return Ok(InstallOutcome::SkippedDuplicate);
        }

        let package = staging.root().join(&file_name);
        self.fetch_package(entry, &file_name, &package)?;
        staging.mark_staged(&file_name);

        let rule = select_rule(entry, &file_name);
        info!("{}: installing {} via {} ({})", entry.hardware_id, file_name, rule.procedure, rule.name);

        match rule.procedure {
            InstallProcedure::NvidiaSilent => {
                run_installer_args(self.runtime, &NvidiaSilentArgs { package })?;
                Ok(InstallOutcome::Installed)
            }
            InstallProcedure::AmdSelfExtract => {
                self.install_amd(&package, &file_name)?;
                Ok(InstallOutcome::Installed)
            }
            InstallProcedure::CabExtract => {
                let stem = Path::new(&file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file_name.clone());
                let destination = staging.root().join(stem);
                self.runtime
                    .extract_archive(&package, &destination)
                    .map_err(|e| DeployError::install_failed(format!("extracting {}: {}", file_name, e)))?;
                Ok(InstallOutcome::Extracted)
            }
        }
    }

    /// Bring the package into staging: copy from the distribution root when
    /// it is there, otherwise download (primary URL, then mirror).
    fn fetch_package(&self, entry: &DriverEntry, file_name: &str, target: &Path) -> Result<()> {
        if let Some(dir) = &self.package_dir {
            let source = dir.join(file_name);
            if source.is_file() {
                debug!("Copying {} -> {}", source.display(), target.display());
                fs::copy(&source, target).map_err(|e| {
                    DeployError::download_failed(format!("copying {}: {}", source.display(), e))
                })?;
                return Ok(());
            }
            debug!("{} not in distribution root, downloading", file_name);
        }

        match self.fetcher.download(&entry.download_url, target) {
            Ok(_) => Ok(()),
            Err(primary) if !entry.mirror_url.trim().is_empty() => {
                warn!("{}: primary download failed ({}), trying mirror", entry.hardware_id, primary);
                self.fetcher.download(&entry.mirror_url, target).map(|_| ())
            }
            Err(primary) => Err(primary),
        }
    }

    /// Run an AMD package; legacy packages are then reinstalled through their
    /// nested Setup.exe. The extraction directory is always removed.
    fn install_amd(&self, package: &Path, file_name: &str) -> Result<()> {
        let result = self.run_amd_package(package, file_name);

        if self.amd_extract_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.amd_extract_dir) {
                warn!("Failed to remove {}: {}", self.amd_extract_dir.display(), e);
            }
        }

        result
    }

    fn run_amd_package(&self, package: &Path, file_name: &str) -> Result<()> {
        run_installer_args(self.runtime, &AmdPackageArgs { package: package.to_path_buf() })?;

        if !is_amd_legacy_package(file_name) {
            return Ok(());
        }

        let setup = find_setup_exe(&self.amd_extract_dir).ok_or_else(|| {
            DeployError::install_failed(format!(
                "legacy AMD package {}: no Setup.exe under {}",
                file_name,
                self.amd_extract_dir.display()
            ))
        })?;
        info!("Legacy AMD package, reinstalling through {}", setup.display());

        run_installer_args(self.runtime, &AmdSetupArgs { setup: setup.clone(), mode: AmdSetupMode::Uninstall })?;
        run_installer_args(self.runtime, &AmdSetupArgs { setup, mode: AmdSetupMode::Install })
    }

    fn install_staged_infs(&self, staging: &Staging) -> BulkOutcome {
        let infs = staging.inf_files();
        if infs.is_empty() {
            info!("No INF files staged, skipping driver-store pass");
            return BulkOutcome::NothingToInstall;
        }

        info!("Installing {} staged INF file(s) into the driver store", infs.len());
        let args = PnpUtilAddDriverArgs { inf_root: staging.root().to_path_buf() };
        match run_installer_args(self.runtime, &args) {
            Ok(()) => BulkOutcome::Installed { inf_count: infs.len() },
            Err(e) => {
                error!("Driver-store install failed: {}", e);
                BulkOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Shallowest `Setup.exe` under `dir`, matched case-insensitively.
fn find_setup_exe(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name().eq_ignore_ascii_case("setup.exe"))
        .min_by_key(|e| e.depth())
        .map(|e| e.into_path())
}
