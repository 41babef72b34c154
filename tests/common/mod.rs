//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use drvdeploy::error::{DeployError, Result};
use drvdeploy::inventory::{DeviceFilter, DeviceRecord, HostInventory};
use drvdeploy::platform::{Fetcher, PackageRuntime, ShareMounter};
use drvdeploy::types::{Credentials, MachineIdentity, Signature};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CATALOG_HEADER: &str = "| MODEL | DESCRIPTION | ID | DRIVER | DDL | MIRROR | ONLINE |\n\
                                  |-------|-------------|----|--------|-----|--------|--------|";

/// Wrap rows into a catalog document with the usual wiki preamble.
pub fn catalog_document(rows: &[String]) -> String {
    format!(
        "# Pilotes\n\nMaintained by the workstation team.\n\n{}\n{}\n{{.dense}}\n\nTrailing notes.\n",
        CATALOG_HEADER,
        rows.join("\n")
    )
}

/// One catalog row in the standard column order.
pub fn catalog_row(model: &str, id: &str, driver: &str, url: &str, mirror: &str) -> String {
    let ddl = if url.is_empty() { String::new() } else { format!("[package]({})", url) };
    let mirror = if mirror.is_empty() { String::new() } else { format!("[mirror]({})", mirror) };
    format!("| {} | test device | {} | {} | {} | {} | YES |", model, id, driver, ddl, mirror)
}

// =============================================================================
// Inventory
// =============================================================================

/// Host with a fixed model and a map of hardware ID prefix to signature.
pub struct MapInventory {
    pub model: String,
    pub installed: HashMap<String, String>,
    /// Hardware IDs whose query fails outright
    pub broken: Vec<String>,
    pub devices: Vec<DeviceRecord>,
    pub queries: RefCell<Vec<String>>,
}

impl MapInventory {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            installed: HashMap::new(),
            broken: Vec::new(),
            devices: Vec::new(),
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn with_driver(mut self, hardware_id: &str, signature: &str) -> Self {
        self.installed.insert(hardware_id.to_string(), signature.to_string());
        self
    }
}

impl HostInventory for MapInventory {
    fn machine_identity(&self) -> Result<MachineIdentity> {
        Ok(MachineIdentity::new(self.model.clone()))
    }

    fn installed_driver_signature(&self, hardware_id: &str) -> Result<Option<Signature>> {
        self.queries.borrow_mut().push(hardware_id.to_string());
        if self.broken.iter().any(|b| b == hardware_id) {
            return Err(DeployError::inventory("Get-PnpDeviceProperty failed"));
        }
        Ok(self.installed.get(hardware_id).map(Signature::new))
    }

    fn present_devices(&self, filter: DeviceFilter) -> Result<Vec<DeviceRecord>> {
        Ok(self
            .devices
            .iter()
            .filter(|d| filter == DeviceFilter::All || d.status.as_deref() != Some("OK"))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Package runtime
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Records every invocation. Archive extraction drops one `.inf` into the
/// destination. AMD self-extraction (`/S`) can lay out a `Setup.exe`.
#[derive(Default)]
pub struct FakeRuntime {
    pub runs: RefCell<Vec<Invocation>>,
    pub extractions: RefCell<Vec<(PathBuf, PathBuf)>>,
    /// Program file name to exit code; unlisted programs exit 0
    pub exit_codes: HashMap<String, i32>,
    /// Where `/S` packages "extract" their nested Setup.exe
    pub amd_extract_dir: Option<PathBuf>,
    pub fail_extract: bool,
}

impl FakeRuntime {
    pub fn program_names(&self) -> Vec<String> {
        self.runs.borrow().iter().map(Invocation::program_name).collect()
    }
}

impl PackageRuntime for FakeRuntime {
    fn run_installer(&self, program: &Path, args: &[String]) -> Result<i32> {
        let invocation = Invocation { program: program.to_path_buf(), args: args.to_vec() };
        let code = self
            .exit_codes
            .get(&invocation.program_name())
            .copied()
            .unwrap_or(0);
        if args == ["/S"] {
            if let Some(dir) = &self.amd_extract_dir {
                let bin = dir.join("Packages").join("Bin64");
                fs::create_dir_all(&bin)?;
                fs::write(bin.join("Setup.exe"), "MZ")?;
            }
        }
        self.runs.borrow_mut().push(invocation);
        Ok(code)
    }

    fn extract_archive(&self, archive: &Path, destination: &Path) -> Result<()> {
        self.extractions
            .borrow_mut()
            .push((archive.to_path_buf(), destination.to_path_buf()));
        if self.fail_extract {
            return Err(DeployError::install_failed("expand.exe exited with code 1"));
        }
        fs::create_dir_all(destination)?;
        fs::write(destination.join("driver.inf"), "[Version]\nSignature=\"$WINDOWS NT$\"\n")?;
        Ok(())
    }
}

// =============================================================================
// Fetcher
// =============================================================================

/// Serves canned bodies by URL; unknown URLs fail.
#[derive(Default)]
pub struct FakeFetcher {
    pub bodies: HashMap<String, String>,
    pub requested: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    pub fn request_count(&self) -> usize {
        self.requested.borrow().len()
    }
}

impl Fetcher for FakeFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        self.requested.borrow_mut().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| DeployError::download_failed(format!("{}: HTTP 404", url)))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let body = self.fetch_text(url)?;
        fs::write(destination, &body)?;
        Ok(body.len() as u64)
    }

    fn post_form(&self, url: &str, _form: &[(&str, &str)]) -> Result<String> {
        self.fetch_text(url)
    }
}

// =============================================================================
// Share
// =============================================================================

/// Pretends every UNC path maps onto a local directory.
pub struct FakeMounter {
    pub local_root: PathBuf,
    pub fail: bool,
    pub log: RefCell<Vec<String>>,
}

impl FakeMounter {
    pub fn new(local_root: &Path) -> Self {
        Self { local_root: local_root.to_path_buf(), fail: false, log: RefCell::new(Vec::new()) }
    }
}

impl ShareMounter for FakeMounter {
    fn mount(&self, unc_path: &str, credentials: &Credentials) -> Result<PathBuf> {
        self.log
            .borrow_mut()
            .push(format!("mount {} as {}", unc_path, credentials.user));
        if self.fail {
            return Err(DeployError::share_unavailable(format!("{}: System error 53", unc_path)));
        }
        Ok(self.local_root.clone())
    }

    fn unmount(&self, local_root: &Path) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("unmount {}", local_root.display()));
        Ok(())
    }
}
