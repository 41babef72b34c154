//! Core data types for driver reconciliation
//!
//! Catalog rows, installed-driver signatures, the machine identity and the
//! per-entry install decision. Enums use strum so their textual forms stay in
//! one place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum::{Display, EnumString};

/// Catalog model value meaning "applies to every machine".
pub const ANY_MODEL: &str = "ANY";

/// Whether a catalog entry is considered live.
///
/// Metadata only: matching never consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum OnlineFlag {
    #[strum(serialize = "YES")]
    Yes,
    #[strum(serialize = "NON")]
    Non,
}

/// One row of the driver catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEntry {
    /// Target machine model, or `ANY`
    pub model: String,
    /// Free-text description (display only)
    pub description: String,
    /// Plug-and-Play hardware ID prefix
    pub hardware_id: String,
    /// Expected installed-driver signature, `<Manufacturer> - <Class> - <Version>`
    pub driver_signature: String,
    /// Primary download URL
    pub download_url: String,
    /// Alternate download URL, empty when the catalog has none
    pub mirror_url: String,
    pub online: Option<OnlineFlag>,
    /// Columns the parser does not know about, keyed by header name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DriverEntry {
    /// Both `model` and `hardware_id` are required for an entry to be actionable.
    pub fn is_actionable(&self) -> bool {
        !self.model.trim().is_empty() && !self.hardware_id.trim().is_empty()
    }

    /// Whether the entry targets the given machine model.
    pub fn applies_to(&self, machine: &MachineIdentity) -> bool {
        let model = self.model.trim();
        model == ANY_MODEL || model == machine.model
    }

    /// URL to fetch, honoring the mirror preference. Empty when neither is set.
    pub fn chosen_url(&self, use_mirror: bool) -> &str {
        if use_mirror { &self.mirror_url } else { &self.download_url }
    }
}

/// Installed-driver signature read from the host.
///
/// Same textual shape as `DriverEntry::driver_signature`. Equality is exact
/// after trimming the outer whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build the canonical `<Manufacturer> - <Class> - <Version>` form.
    pub fn from_parts(manufacturer: &str, class: &str, version: &str) -> Self {
        Self(format!("{} - {} - {}", manufacturer.trim(), class.trim(), version.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact comparison against a catalog signature, outer whitespace ignored.
    pub fn matches(&self, expected: &str) -> bool {
        self.0.trim() == expected.trim()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the machine being reconciled, computed once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub model: String,
}

/// Manufacturer whose catalogs key on the system family rather than the model.
pub const FAMILY_KEYED_VENDOR: &str = "LENOVO";

impl MachineIdentity {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into().trim().to_string() }
    }

    /// Resolve the catalog model from raw system information.
    ///
    /// Lenovo reports a type code in `model` ("20XW003GFR") and the marketing
    /// name in `family` ("ThinkPad T14 Gen 2i"); catalogs are keyed on the
    /// latter. Every other vendor uses `model`.
    pub fn from_system_info(manufacturer: &str, model: &str, family: Option<&str>) -> Self {
        let is_family_vendor = manufacturer
            .to_ascii_uppercase()
            .contains(FAMILY_KEYED_VENDOR);
        match family.map(str::trim) {
            Some(family) if is_family_vendor && !family.is_empty() => Self::new(family),
            _ => Self::new(model),
        }
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.model)
    }
}

/// Outcome of reconciling one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallAction {
    SkipModelMismatch,
    SkipDeviceAbsent,
    SkipAlreadyCurrent,
    SkipDuplicateStaged,
    Install,
}

impl InstallAction {
    pub fn is_install(self) -> bool {
        matches!(self, Self::Install)
    }
}

/// A catalog entry paired with what should happen to it on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallDecision {
    pub entry: DriverEntry,
    pub action: InstallAction,
    /// Signature currently installed, when the device was found
    pub installed: Option<Signature>,
}

/// Credentials for mounting the distribution share.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
