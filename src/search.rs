//! Microsoft Update Catalog lookup ("search" and "scan" modes)
//!
//! Best-effort: queries the public catalog website for a hardware ID and
//! formats the first hit as a ready-to-paste catalog row. Page layout changes
//! on the website degrade to "no result", never to a crash.
//!
//! # Flow
//!
//! 1. `GET Search.aspx?q=<id>` and scrape the first result row
//! 2. `POST DownloadDialog.aspx` with the update GUID to resolve the file URL
//! 3. Print `| ANY | <title> | <id> | [<title>](<details>) | [<file>](<url>) |  | NON |`

use crate::error::Result;
use crate::hardware_id::{normalize_hardware_id, package_file_name};
use crate::inventory::{DeviceFilter, HostInventory};
use crate::platform::Fetcher;
use crate::types::{ANY_MODEL, OnlineFlag};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

const CATALOG_BASE: &str = "https://www.catalog.update.microsoft.com";

/// One Update Catalog search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogHit {
    pub hardware_id: String,
    pub update_id: String,
    /// Update title, e.g. `NVIDIA - Display - 32.0.15.6094`
    pub title: String,
    pub download_url: Option<String>,
}

impl CatalogHit {
    pub fn details_url(&self) -> String {
        format!("{}/ScopedViewInline.aspx?updateid={}", CATALOG_BASE, self.update_id)
    }

    /// Format the hit as a catalog table row.
    pub fn to_catalog_row(&self) -> String {
        let ddl = match &self.download_url {
            Some(url) => {
                let name = package_file_name(url).unwrap_or_else(|| "download".to_string());
                format!("[{}]({})", name, url)
            }
            None => String::new(),
        };
        format!(
            "| {} | {} | {} | [{}]({}) | {} |  | {} |",
            ANY_MODEL,
            self.title,
            self.hardware_id,
            self.title,
            self.details_url(),
            ddl,
            OnlineFlag::Non
        )
    }
}

fn result_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)goToDetails\("([0-9a-fA-F-]{36})"\);'?"?[^>]*>\s*(.*?)\s*</a>"#)
            .expect("result regex is valid")
    })
}

fn download_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"downloadInformation\[0\]\.files\[0\]\.url\s*=\s*'([^']+)'"#)
            .expect("download regex is valid")
    })
}

/// First `(update_id, title)` pair on a search results page.
pub fn parse_first_result(html: &str) -> Option<(String, String)> {
    let caps = result_link_regex().captures(html)?;
    let update_id = caps.get(1)?.as_str().to_string();
    let title = caps
        .get(2)?
        .as_str()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if title.is_empty() { None } else { Some((update_id, title)) }
}

/// File URL from a DownloadDialog response.
pub fn parse_download_url(html: &str) -> Option<String> {
    download_url_regex()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Search the Update Catalog for one hardware ID.
///
/// Returns `Ok(None)` when the catalog has no result.
pub fn search_catalog(hardware_id: &str, fetcher: &dyn Fetcher) -> Result<Option<CatalogHit>> {
    let id = normalize_hardware_id(hardware_id);
    let url = format!("{}/Search.aspx?q={}", CATALOG_BASE, urlencoding::encode(&id));
    let page = fetcher.fetch_text(&url)?;

    let Some((update_id, title)) = parse_first_result(&page) else {
        info!("No Update Catalog result for {}", id);
        return Ok(None);
    };

    let payload = format!(
        r#"[{{"size":0,"languages":"","uidInfo":"{0}","updateID":"{0}"}}]"#,
        update_id
    );
    let dialog_url = format!("{}/DownloadDialog.aspx", CATALOG_BASE);
    let download_url = match fetcher.post_form(&dialog_url, &[("updateIDs", payload.as_str())]) {
        Ok(body) => parse_download_url(&body),
        Err(e) => {
            warn!("Could not resolve download for {}: {}", update_id, e);
            None
        }
    };

    Ok(Some(CatalogHit { hardware_id: id, update_id, title, download_url }))
}

/// Search every present device with a problem status. Lookup failures for
/// one device are logged and do not stop the scan.
pub fn scan_problem_devices(
    inventory: &dyn HostInventory,
    fetcher: &dyn Fetcher,
) -> Result<Vec<CatalogHit>> {
    let devices = inventory.present_devices(DeviceFilter::ProblemOnly)?;
    info!("{} device(s) report a problem status", devices.len());

    let mut hits = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for device in devices {
        let id = normalize_hardware_id(&device.instance_id);
        if !seen.insert(id.clone()) {
            continue;
        }
        info!(
            "Searching catalog for {} ({})",
            id,
            device.description.as_deref().unwrap_or("unnamed device")
        );
        match search_catalog(&id, fetcher) {
            Ok(Some(hit)) => hits.push(hit),
            Ok(None) => {}
            Err(e) => warn!("{}: search failed: {}", id, e),
        }
    }
    Ok(hits)
}
