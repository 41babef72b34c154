//! Host Inventory Adapter
//!
//! Wraps hardware and installed-driver introspection behind `HostInventory`.
//!
//! # Absent vs Broken
//!
//! A signature lookup has three outcomes, kept distinct:
//!
//! | Result            | Meaning |
//! |-------------------|---------|
//! | `Ok(Some(sig))`   | Device present, driver properties readable |
//! | `Ok(None)`        | No matching device, or it has no driver properties |
//! | `Err(..)`         | The query mechanism itself failed |
//!
//! The reconciler treats both `Ok(None)` and `Err` as "not present", but logs
//! the latter as a query failure. Nothing is retried.

use crate::error::{DeployError, Result};
use crate::process::{ps_quote, run_powershell};
use crate::types::{MachineIdentity, Signature};
use serde::Deserialize;
use tracing::{debug, info};

/// Which present devices to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFilter {
    All,
    /// Only devices whose status is not OK (missing or failed driver)
    ProblemOnly,
}

/// A present device as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "FriendlyName", default)]
    pub description: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
}

/// Query surface the reconciler and scan mode depend on.
pub trait HostInventory {
    /// Identity of this machine, as catalogs key it.
    fn machine_identity(&self) -> Result<MachineIdentity>;

    /// Installed driver signature for the first device whose instance ID
    /// starts with `hardware_id`.
    fn installed_driver_signature(&self, hardware_id: &str) -> Result<Option<Signature>>;

    /// Devices currently present on the host.
    fn present_devices(&self, filter: DeviceFilter) -> Result<Vec<DeviceRecord>>;
}

// ============================================================================
// Windows PnP implementation
// ============================================================================

/// `HostInventory` backed by PowerShell's PnP and CIM cmdlets.
#[derive(Debug, Default, Clone)]
pub struct PnpInventory;

const SYSTEM_INFO_SCRIPT: &str = "$cs = Get-CimInstance -ClassName Win32_ComputerSystem; \
     \"$($cs.Manufacturer)|$($cs.Model)|$($cs.SystemFamily)\"";

fn signature_script(hardware_id: &str) -> String {
    format!(
        "$id = {id}; \
         $d = Get-PnpDevice -PresentOnly -ErrorAction SilentlyContinue | \
              Where-Object {{ $_.InstanceId.StartsWith($id, [StringComparison]::OrdinalIgnoreCase) }} | \
              Select-Object -First 1; \
         if (-not $d) {{ exit 0 }}; \
         $keys = 'DEVPKEY_Device_Manufacturer','DEVPKEY_Device_Class','DEVPKEY_Device_DriverVersion'; \
         $p = Get-PnpDeviceProperty -InstanceId $d.InstanceId -KeyName $keys -ErrorAction Stop; \
         [pscustomobject]@{{ \
             InstanceId = $d.InstanceId; \
             Manufacturer = ($p | Where-Object KeyName -eq $keys[0]).Data; \
             Class = ($p | Where-Object KeyName -eq $keys[1]).Data; \
             DriverVersion = ($p | Where-Object KeyName -eq $keys[2]).Data \
         }} | ConvertTo-Json -Compress",
        id = ps_quote(hardware_id)
    )
}

fn device_list_script(filter: DeviceFilter) -> String {
    let status_filter = match filter {
        DeviceFilter::All => "",
        DeviceFilter::ProblemOnly => "| Where-Object Status -ne 'OK' ",
    };
    format!(
        "@(Get-PnpDevice -PresentOnly {}| Select-Object InstanceId, FriendlyName, Status) | \
         ConvertTo-Json -Compress",
        status_filter
    )
}

impl HostInventory for PnpInventory {
    fn machine_identity(&self) -> Result<MachineIdentity> {
        let line = run_powershell(SYSTEM_INFO_SCRIPT)?;
        let identity = parse_system_info(&line)?;
        info!("Machine model: {}", identity);
        Ok(identity)
    }

    fn installed_driver_signature(&self, hardware_id: &str) -> Result<Option<Signature>> {
        let json = run_powershell(&signature_script(hardware_id))?;
        parse_signature_json(&json)
    }

    fn present_devices(&self, filter: DeviceFilter) -> Result<Vec<DeviceRecord>> {
        let json = run_powershell(&device_list_script(filter))?;
        parse_device_list(&json)
    }
}

// ============================================================================
// Output parsing
// ============================================================================

/// Parse `Manufacturer|Model|SystemFamily` into the machine identity.
pub fn parse_system_info(line: &str) -> Result<MachineIdentity> {
    let mut parts = line.trim().splitn(3, '|');
    let manufacturer = parts.next().unwrap_or_default();
    let model = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| DeployError::inventory(format!("no model in system info '{}'", line)))?;
    let family = parts.next();
    Ok(MachineIdentity::from_system_info(manufacturer, model, family))
}

#[derive(Debug, Deserialize)]
struct DeviceProperties {
    #[serde(rename = "InstanceId")]
    instance_id: String,
    #[serde(rename = "Manufacturer")]
    manufacturer: Option<String>,
    #[serde(rename = "Class")]
    class: Option<String>,
    #[serde(rename = "DriverVersion")]
    driver_version: Option<String>,
}

/// Parse the signature query output. Empty output means no matching device;
/// a device with any missing property has no usable driver.
pub fn parse_signature_json(json: &str) -> Result<Option<Signature>> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(None);
    }
    let props: DeviceProperties = serde_json::from_str(json)
        .map_err(|e| DeployError::inventory(format!("unreadable device properties: {}", e)))?;

    let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    match (present(&props.manufacturer), present(&props.class), present(&props.driver_version)) {
        (Some(manufacturer), Some(class), Some(version)) => {
            Ok(Some(Signature::from_parts(&manufacturer, &class, &version)))
        }
        _ => {
            debug!("Device {} has incomplete driver properties", props.instance_id);
            Ok(None)
        }
    }
}

/// Parse the device list query output. PowerShell emits a bare object for a
/// single result and an array otherwise; both are accepted.
pub fn parse_device_list(json: &str) -> Result<Vec<DeviceRecord>> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| DeployError::inventory(format!("unreadable device list: {}", e)))?;
    let devices = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        serde_json::Value::Null => Vec::new(),
        other => vec![serde_json::from_value(other)?],
    };
    Ok(devices)
}
