//! Type-safe installer argument contracts.
//!
//! Each external program the installer drives has a struct implementing
//! `InstallerArgs`. The struct definition IS the contract: flag spellings live
//! in exactly one place and the dispatch code never builds raw string vectors.

use std::path::{Path, PathBuf};

/// Trait for typed installer invocations.
///
/// # Contract
///
/// - `program()`: the executable to launch (absolute path or a name on `PATH`).
/// - `to_cli_args()`: arguments exactly as the program expects them.
/// - `label()`: short name used in logs and error messages.
pub trait InstallerArgs {
    fn program(&self) -> PathBuf;

    fn to_cli_args(&self) -> Vec<String>;

    fn label(&self) -> &'static str;
}

/// NVIDIA display package: silent install, no reboot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvidiaSilentArgs {
    pub package: PathBuf,
}

impl InstallerArgs for NvidiaSilentArgs {
    fn program(&self) -> PathBuf {
        self.package.clone()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-s".to_string(), "-noreboot".to_string()]
    }

    fn label(&self) -> &'static str {
        "nvidia-setup"
    }
}

/// AMD self-extracting display package: silent extract and install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmdPackageArgs {
    pub package: PathBuf,
}

impl InstallerArgs for AmdPackageArgs {
    fn program(&self) -> PathBuf {
        self.package.clone()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["/S".to_string()]
    }

    fn label(&self) -> &'static str {
        "amd-package"
    }
}

/// Operation passed to the nested AMD `Setup.exe` of a legacy package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmdSetupMode {
    Uninstall,
    Install,
}

/// Nested `Setup.exe` extracted from a legacy AMD package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmdSetupArgs {
    pub setup: PathBuf,
    pub mode: AmdSetupMode,
}

impl InstallerArgs for AmdSetupArgs {
    fn program(&self) -> PathBuf {
        self.setup.clone()
    }

    fn to_cli_args(&self) -> Vec<String> {
        match self.mode {
            AmdSetupMode::Uninstall => vec!["-uninstall".to_string(), "all".to_string()],
            AmdSetupMode::Install => vec!["-install".to_string()],
        }
    }

    fn label(&self) -> &'static str {
        match self.mode {
            AmdSetupMode::Uninstall => "amd-setup-uninstall",
            AmdSetupMode::Install => "amd-setup-install",
        }
    }
}

/// Bulk driver-store install of every INF under a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnpUtilAddDriverArgs {
    pub inf_root: PathBuf,
}

impl InstallerArgs for PnpUtilAddDriverArgs {
    fn program(&self) -> PathBuf {
        PathBuf::from("pnputil.exe")
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "/add-driver".to_string(),
            self.inf_root.join("*.inf").display().to_string(),
            "/subdirs".to_string(),
            "/install".to_string(),
        ]
    }

    fn label(&self) -> &'static str {
        "pnputil"
    }
}

/// Cabinet expansion with `expand.exe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandCabArgs {
    pub archive: PathBuf,
    pub destination: PathBuf,
}

impl ExpandCabArgs {
    pub fn new(archive: &Path, destination: &Path) -> Self {
        Self {
            archive: archive.to_path_buf(),
            destination: destination.to_path_buf(),
        }
    }
}

impl InstallerArgs for ExpandCabArgs {
    fn program(&self) -> PathBuf {
        PathBuf::from("expand.exe")
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            self.archive.display().to_string(),
            "-F:*".to_string(),
            self.destination.display().to_string(),
        ]
    }

    fn label(&self) -> &'static str {
        "expand"
    }
}
