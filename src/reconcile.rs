//! Driver Reconciler
//!
//! Decides, for every catalog entry in catalog order, whether its driver must
//! be installed on this host.
//!
//! # Decision Rules
//!
//! | Step | Condition                                   | Action |
//! |------|---------------------------------------------|--------|
//! | 1    | `model` or `hardware_id` empty              | `SkipModelMismatch` (logged as invalid row) |
//! | 2    | `model` is neither `ANY` nor this machine   | `SkipModelMismatch` |
//! | 3    | No installed signature for the hardware ID  | `SkipDeviceAbsent` |
//! | 4    | Installed signature equals the catalog one  | `SkipAlreadyCurrent` |
//! | 5    | Otherwise                                   | `Install` |
//!
//! # Design
//!
//! - **Read-only**: queries the inventory, never mutates catalog or host
//! - **Order-preserving**: one decision per entry, same order as the catalog
//! - **Exact matching**: signatures compare as trimmed strings, no version logic

use crate::error::DeployError;
use crate::inventory::HostInventory;
use crate::types::{DriverEntry, InstallAction, InstallDecision, MachineIdentity};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Reconcile catalog entries against the host.
pub fn reconcile(
    entries: &[DriverEntry],
    machine: &MachineIdentity,
    inventory: &dyn HostInventory,
) -> Vec<InstallDecision> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| decide(index, entry, machine, inventory))
        .collect()
}

fn decide(
    index: usize,
    entry: &DriverEntry,
    machine: &MachineIdentity,
    inventory: &dyn HostInventory,
) -> InstallDecision {
    let skip = |action| InstallDecision { entry: entry.clone(), action, installed: None };

    if !entry.is_actionable() {
        let err = DeployError::invalid_row(format!(
            "row {} (model '{}', id '{}') lacks a model or hardware ID",
            index + 1,
            entry.model,
            entry.hardware_id
        ));
        warn!("{}", err);
        return skip(InstallAction::SkipModelMismatch);
    }

    if !entry.applies_to(machine) {
        debug!("{}: model '{}' does not match '{}'", entry.hardware_id, entry.model, machine);
        return skip(InstallAction::SkipModelMismatch);
    }

    let installed = match inventory.installed_driver_signature(entry.hardware_id.trim()) {
        Ok(Some(signature)) => signature,
        Ok(None) => {
            info!("{}", DeployError::device_not_found(entry.hardware_id.trim()));
            return skip(InstallAction::SkipDeviceAbsent);
        }
        Err(e) => {
            warn!("{}: driver query failed, treating as not present: {}", entry.hardware_id, e);
            return skip(InstallAction::SkipDeviceAbsent);
        }
    };

    let action = if installed.matches(&entry.driver_signature) {
        info!("{}: already current ({})", entry.hardware_id, installed);
        InstallAction::SkipAlreadyCurrent
    } else {
        info!(
            "{}: installed '{}' differs from catalog '{}', will install",
            entry.hardware_id, installed, entry.driver_signature
        );
        InstallAction::Install
    };

    InstallDecision { entry: entry.clone(), action, installed: Some(installed) }
}

/// Entries the installer should act on, in catalog order.
pub fn install_list(decisions: &[InstallDecision]) -> Vec<&DriverEntry> {
    decisions
        .iter()
        .filter(|d| d.action.is_install())
        .map(|d| &d.entry)
        .collect()
}

/// Count of decisions per action, for the end-of-run log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    counts: HashMap<InstallAction, usize>,
}

impl ReconcileSummary {
    pub fn from_decisions(decisions: &[InstallDecision]) -> Self {
        let mut counts = HashMap::new();
        for decision in decisions {
            *counts.entry(decision.action).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn count(&self, action: InstallAction) -> usize {
        self.counts.get(&action).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries: {} to install, {} current, {} absent, {} other model, {} duplicate",
            self.total(),
            self.count(InstallAction::Install),
            self.count(InstallAction::SkipAlreadyCurrent),
            self.count(InstallAction::SkipDeviceAbsent),
            self.count(InstallAction::SkipModelMismatch),
            self.count(InstallAction::SkipDuplicateStaged),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::inventory::{DeviceFilter, DeviceRecord};
    use crate::types::Signature;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MapInventory {
        installed: HashMap<String, Signature>,
        broken: Vec<String>,
        queried: RefCell<Vec<String>>,
    }

    impl HostInventory for MapInventory {
        fn machine_identity(&self) -> Result<MachineIdentity> {
            Ok(MachineIdentity::new("Latitude 5420"))
        }

        fn installed_driver_signature(&self, hardware_id: &str) -> Result<Option<Signature>> {
            self.queried.borrow_mut().push(hardware_id.to_string());
            if self.broken.iter().any(|b| b == hardware_id) {
                return Err(DeployError::inventory("WMI unavailable"));
            }
            Ok(self.installed.get(hardware_id).cloned())
        }

        fn present_devices(&self, _filter: DeviceFilter) -> Result<Vec<DeviceRecord>> {
            Ok(Vec::new())
        }
    }

    fn entry(model: &str, id: &str, driver: &str) -> DriverEntry {
        DriverEntry {
            model: model.to_string(),
            hardware_id: id.to_string(),
            driver_signature: driver.to_string(),
            download_url: "http://x/pkg.exe".to_string(),
            ..Default::default()
        }
    }

    fn machine() -> MachineIdentity {
        MachineIdentity::new("Latitude 5420")
    }

    #[test]
    fn test_invalid_row_skipped_without_query() {
        let inv = MapInventory::default();
        let decisions = reconcile(&[entry("", "PCI\\VEN_1", "x"), entry("ANY", "", "x")], &machine(), &inv);
        assert!(decisions.iter().all(|d| d.action == InstallAction::SkipModelMismatch));
        assert!(inv.queried.borrow().is_empty());
    }

    #[test]
    fn test_other_model_skipped_without_query() {
        let inv = MapInventory::default();
        let decisions = reconcile(&[entry("OptiPlex 7090", "PCI\\VEN_1", "x")], &machine(), &inv);
        assert_eq!(decisions[0].action, InstallAction::SkipModelMismatch);
        assert!(inv.queried.borrow().is_empty());
    }

    #[test]
    fn test_absent_device_skipped() {
        let inv = MapInventory::default();
        let decisions = reconcile(&[entry("ANY", "PCI\\VEN_1", "x")], &machine(), &inv);
        assert_eq!(decisions[0].action, InstallAction::SkipDeviceAbsent);
        assert_eq!(decisions[0].installed, None);
    }

    #[test]
    fn test_query_failure_treated_as_absent() {
        let inv = MapInventory { broken: vec!["PCI\\VEN_1".into()], ..Default::default() };
        let decisions = reconcile(&[entry("ANY", "PCI\\VEN_1", "x")], &machine(), &inv);
        assert_eq!(decisions[0].action, InstallAction::SkipDeviceAbsent);
    }

    #[test]
    fn test_current_and_outdated() {
        let mut inv = MapInventory::default();
        inv.installed.insert("PCI\\VEN_1".into(), Signature::new("Intel - Net - 1.2"));
        inv.installed.insert("PCI\\VEN_2".into(), Signature::new("Intel - Net - 1.1"));

        let decisions = reconcile(
            &[
                entry("Latitude 5420", "PCI\\VEN_1", "Intel - Net - 1.2"),
                entry("ANY", "PCI\\VEN_2", "Intel - Net - 1.2"),
            ],
            &machine(),
            &inv,
        );
        assert_eq!(decisions[0].action, InstallAction::SkipAlreadyCurrent);
        assert_eq!(decisions[1].action, InstallAction::Install);
        assert_eq!(decisions[1].installed, Some(Signature::new("Intel - Net - 1.1")));
    }

    #[test]
    fn test_whitespace_difference_inside_signature_installs() {
        let mut inv = MapInventory::default();
        inv.installed.insert("PCI\\VEN_1".into(), Signature::new("Intel - Net - 1.2"));
        let decisions = reconcile(&[entry("ANY", "PCI\\VEN_1", "Intel -  Net - 1.2")], &machine(), &inv);
        assert_eq!(decisions[0].action, InstallAction::Install);
    }

    #[test]
    fn test_order_preserved_and_summary() {
        let mut inv = MapInventory::default();
        inv.installed.insert("B".into(), Signature::new("s"));
        let entries = vec![entry("ANY", "A", "s"), entry("ANY", "B", "s"), entry("X", "C", "s"), entry("ANY", "B", "t")];
        let decisions = reconcile(&entries, &machine(), &inv);

        let ids: Vec<&str> = decisions.iter().map(|d| d.entry.hardware_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "B"]);

        let summary = ReconcileSummary::from_decisions(&decisions);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.count(InstallAction::Install), 1);
        assert_eq!(summary.count(InstallAction::SkipAlreadyCurrent), 1);
        assert_eq!(summary.count(InstallAction::SkipDeviceAbsent), 1);
        assert_eq!(summary.count(InstallAction::SkipModelMismatch), 1);

        let to_install = install_list(&decisions);
        assert_eq!(to_install.len(), 1);
        assert_eq!(to_install[0].driver_signature, "t");
    }
}
