//! Hardware-ID and package-name helpers
//!
//! Device instance IDs carry per-instance suffixes (revision, port path,
//! instance counter). Searches and catalogs work on the stable device-class
//! prefix, so IDs are normalized before lookup.

/// Bus prefixes whose instance IDs are truncated at the last path separator.
const PATH_TRUNCATED_BUSES: &[&str] = &["ACPI\\", "USB\\"];

/// Reduce a device instance ID to its device-class-level ID.
///
/// - `PCI\VEN_10DE&DEV_2206&SUBSYS_..&REV_A1\4&..` → `PCI\VEN_10DE&DEV_2206&SUBSYS_..`
/// - `USB\VID_046D&PID_C52B\5&2A1B` → `USB\VID_046D&PID_C52B`
/// - `ACPI\INT33A1\1` → `ACPI\INT33A1`
///
/// IDs from other buses, and ACPI/USB IDs that are already class-level
/// (a single separator), are returned trimmed but otherwise unchanged.
pub fn normalize_hardware_id(raw: &str) -> String {
    let id = raw.trim();
    let upper = id.to_ascii_uppercase();

    if upper.starts_with("PCI\\") {
        return match upper.find("&REV") {
            Some(pos) => id[..pos].to_string(),
            None => id.to_string(),
        };
    }

    if PATH_TRUNCATED_BUSES.iter().any(|bus| upper.starts_with(bus)) && id.matches('\\').count() >= 2 {
        if let Some(pos) = id.rfind('\\') {
            return id[..pos].to_string();
        }
    }

    id.to_string()
}

/// Derive the staged package filename from a download URL: its last path
/// segment, without query string or fragment.
///
/// Returns `None` when the URL has no usable final segment.
pub fn package_file_name(url: &str) -> Option<String> {
    let url = url.trim();
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit(['/', '\\']).next()?.trim();
    if segment.is_empty() || segment.contains(':') {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Lower-case file extension of a package filename (`"exe"`, `"cab"`).
pub fn package_extension(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}
