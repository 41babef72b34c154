//! Tests for the Package Installer
//!
//! Exercises `PackageInstaller` directly, without reconciliation.
//!
//! These tests verify:
//! - AMD self-extracting packages, including the legacy Setup.exe reinstall
//! - Cleanup of the AMD extraction directory on success and failure
//! - Entries that cannot be staged

mod common;

use common::*;
use drvdeploy::installer::{InstallOutcome, PackageInstaller, Staging};
use drvdeploy::types::DriverEntry;
use std::collections::HashMap;

const AMD_SIG: &str = "Advanced Micro Devices, Inc. - Display - 27.20.21034.37";

fn amd_entry(url: &str) -> DriverEntry {
    DriverEntry {
        model: "ANY".into(),
        hardware_id: "PCI\\VEN_1002&DEV_73BF".into(),
        driver_signature: AMD_SIG.into(),
        download_url: url.into(),
        ..Default::default()
    }
}

// =============================================================================
// AMD packages
// =============================================================================

#[test]
fn test_current_amd_package_runs_once() {
    let dir = tempfile::tempdir().expect("tempdir"); // test: scratch dir
    let extract = dir.path().join("AMD");
    let url = "https://drivers.amd.com/drivers/amd-software-adrenalin-edition-24.3.1.exe";
    let runtime = FakeRuntime { amd_extract_dir: Some(extract.clone()), ..Default::default() };
    let fetcher = FakeFetcher::default().with(url, "MZ");
    let installer = PackageInstaller::new(&runtime, &fetcher).with_amd_extract_dir(&extract);
    let mut staging = Staging::create(&dir.path().join("staging")).expect("staging"); // test: writable tempdir

    let outcome = installer.install(&amd_entry(url), &mut staging).expect("install succeeds"); // test: fakes succeed

    assert_eq!(outcome, InstallOutcome::Installed);
    let runs = runtime.runs.borrow();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].args, vec!["/S"]);
    assert!(!extract.exists(), "extraction directory is always removed");
}

#[test]
fn test_legacy_amd_package_reinstalls_through_setup() {
    let dir = tempfile::tempdir().expect("tempdir"); // test: scratch dir
    let extract = dir.path().join("AMD");
    let url = "https://drivers.amd.com/drivers/win10-64bit-radeon-software-adrenalin-2020-21.5.2.exe";
    let runtime = FakeRuntime { amd_extract_dir: Some(extract.clone()), ..Default::default() };
    let fetcher = FakeFetcher::default().with(url, "MZ");
    let installer = PackageInstaller::new(&runtime, &fetcher).with_amd_extract_dir(&extract);
    let mut staging = Staging::create(&dir.path().join("staging")).expect("staging"); // test: writable tempdir

    let outcome = installer.install(&amd_entry(url), &mut staging).expect("install succeeds"); // test: fakes succeed

    assert_eq!(outcome, InstallOutcome::Installed);
    let runs = runtime.runs.borrow();
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].args, vec!["/S"]);
    assert_eq!(runs[1].program_name(), "Setup.exe");
    assert_eq!(runs[1].args, vec!["-uninstall", "all"]);
    assert_eq!(runs[2].program_name(), "Setup.exe");
    assert_eq!(runs[2].args, vec!["-install"]);
    assert!(!extract.exists());
}

#[test]
fn test_legacy_amd_package_without_setup_fails_and_cleans_up() {
    let dir = tempfile::tempdir().expect("tempdir"); // test: scratch dir
    let extract = dir.path().join("AMD");
    std::fs::create_dir_all(extract.join("Config")).expect("mkdir"); // test: writable tempdir
    let url = "https://drivers.amd.com/drivers/radeon-crimson-16.2.1.exe";
    let runtime = FakeRuntime::default();
    let fetcher = FakeFetcher::default().with(url, "MZ");
    let installer = PackageInstaller::new(&runtime, &fetcher).with_amd_extract_dir(&extract);
    let mut staging = Staging::create(&dir.path().join("staging")).expect("staging"); // test: writable tempdir

    let result = installer.install(&amd_entry(url), &mut staging);

    assert!(result.is_err());
    assert_eq!(runtime.runs.borrow().len(), 1);
    assert!(!extract.exists());
}

#[test]
fn test_amd_package_failure_skips_setup() {
    let dir = tempfile::tempdir().expect("tempdir"); // test: scratch dir
    let extract = dir.path().join("AMD");
    let url = "https://drivers.amd.com/drivers/radeon-crimson-16.2.1.exe";
    let runtime = FakeRuntime {
        amd_extract_dir: Some(extract.clone()),
        exit_codes: HashMap::from([("radeon-crimson-16.2.1.exe".to_string(), 2)]),
        ..Default::default()
    };
    let fetcher = FakeFetcher::default().with(url, "MZ");
    let installer = PackageInstaller::new(&runtime, &fetcher).with_amd_extract_dir(&extract);
    let mut staging = Staging::create(&dir.path().join("staging")).expect("staging"); // test: writable tempdir

    let result = installer.install(&amd_entry(url), &mut staging);

    assert!(result.is_err());
    assert_eq!(runtime.program_names(), vec!["radeon-crimson-16.2.1.exe"]);
    assert!(!extract.exists());
}

// =============================================================================
// Staging edge cases
// =============================================================================

#[test]
fn test_url_without_file_name_fails() {
    let dir = tempfile::tempdir().expect("tempdir"); // test: scratch dir
    let runtime = FakeRuntime::default();
    let fetcher = FakeFetcher::default();
    let installer = PackageInstaller::new(&runtime, &fetcher);
    let mut staging = Staging::create(dir.path()).expect("staging"); // test: writable tempdir

    let entry = DriverEntry { download_url: String::new(), ..amd_entry("") };
    assert!(installer.install(&entry, &mut staging).is_err());
    assert_eq!(fetcher.request_count(), 0);
}

#[test]
fn test_failed_extraction_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir"); // test: scratch dir
    let url = "https://dl.example.com/intel/net.cab";
    let runtime = FakeRuntime { fail_extract: true, ..Default::default() };
    let fetcher = FakeFetcher::default().with(url, "MSCF");
    let installer = PackageInstaller::new(&runtime, &fetcher);
    let mut staging = Staging::create(dir.path()).expect("staging"); // test: writable tempdir

    let entry = DriverEntry {
        model: "ANY".into(),
        hardware_id: "PCI\\VEN_8086&DEV_15F3".into(),
        driver_signature: "Intel - Net - 1.1.3.28".into(),
        download_url: url.into(),
        ..Default::default()
    };
    assert!(installer.install(&entry, &mut staging).is_err());
    assert!(staging.inf_files().is_empty());
}
