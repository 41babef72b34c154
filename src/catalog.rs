//! Catalog Parser
//!
//! Converts the markdown driver catalog into typed `DriverEntry` rows.
//!
//! # Document Shape
//!
//! The catalog is a pipe table whose header row contains `| MODEL` and whose
//! section ends at the literal `{.dense}` token:
//!
//! ```text
//! | MODEL | DESCRIPTION | ID | DRIVER | DDL | MIRROR | ONLINE |
//! |-------|-------------|----|--------|-----|--------|--------|
//! | ANY | GPU | PCI\VEN_10DE&DEV_2206 | [NVIDIA - Display - 32.0.15.6094](http://..) | [dl](https://..) | | YES |
//!
//! {.dense}
//! ```
//!
//! # Design
//!
//! - **Column-name driven**: the header is read once into a list of `Column`
//!   accessors; rows are mapped by name, never by position
//! - **Schema drift tolerant**: unknown columns land in `DriverEntry::extra`
//! - **Lenient rows**: short rows default missing cells to empty and are left
//!   for the reconciler to reject; only missing markers are fatal

use crate::error::{DeployError, Result};
use crate::types::{DriverEntry, OnlineFlag};
use std::path::Path;
use tracing::{debug, warn};

/// Marker that opens the catalog table.
pub const TABLE_START_MARKER: &str = "| MODEL";
/// Marker that closes the catalog section.
pub const TABLE_END_MARKER: &str = "{.dense}";

/// Canonical catalog columns, resolved from header text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Model,
    Description,
    HardwareId,
    Driver,
    Download,
    Mirror,
    Online,
    /// Unrecognized header, passed through verbatim
    Other(String),
}

impl Column {
    /// Resolve a header cell to its column. Matching is case-insensitive.
    pub fn from_header(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "MODEL" => Self::Model,
            "DESCRIPTION" | "NAME" => Self::Description,
            "ID" | "HWID" | "HARDWARE ID" => Self::HardwareId,
            "DRIVER" => Self::Driver,
            "DDL" => Self::Download,
            "MIRROR" => Self::Mirror,
            "ONLINE" => Self::Online,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    /// Write one cell into the entry according to this column's extraction rule.
    fn apply(&self, entry: &mut DriverEntry, cell: &str) {
        let cell = cell.trim();
        match self {
            Self::Model => entry.model = cell.to_string(),
            Self::Description => entry.description = cell.to_string(),
            Self::HardwareId => entry.hardware_id = cell.to_string(),
            Self::Driver => entry.driver_signature = extract_link_text(cell),
            Self::Download => entry.download_url = extract_link_url(cell),
            Self::Mirror => entry.mirror_url = extract_link_url(cell),
            Self::Online => {
                entry.online = match cell.parse::<OnlineFlag>() {
                    Ok(flag) => Some(flag),
                    Err(_) => {
                        if !cell.is_empty() {
                            debug!("Unrecognized ONLINE value '{}'", cell);
                        }
                        None
                    }
                }
            }
            Self::Other(name) => {
                entry.extra.insert(name.clone(), cell.to_string());
            }
        }
    }
}

/// Extract the URL embedded in a markdown link cell.
///
/// Takes everything from the first `http` to the end of the cell, minus the
/// closing `)` of the link. Cells with no `http` yield an empty string.
pub fn extract_link_url(cell: &str) -> String {
    let cell = cell.trim();
    let Some(start) = cell.find("http") else {
        return String::new();
    };
    let tail = &cell[start..];
    tail.strip_suffix(')')
        .or_else(|| tail.strip_suffix('>'))
        .unwrap_or(tail)
        .trim()
        .to_string()
}

/// Extract the bracketed text of a `[text](link)` cell.
///
/// Cells that are not in link form are returned trimmed.
pub fn extract_link_text(cell: &str) -> String {
    let cell = cell.trim();
    match (cell.strip_prefix('['), cell.find(']')) {
        (Some(_), Some(end)) => cell[1..end].trim().to_string(),
        _ => cell.to_string(),
    }
}

/// Split a pipe-table line into trimmed cells, dropping the outer pipes.
pub fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').map(|c| c.trim().to_string()).collect()
}

/// Locate the table window: from the start of the line holding the start
/// marker up to the end marker.
fn table_window(document: &str) -> Result<&str> {
    let marker = document.find(TABLE_START_MARKER).ok_or_else(|| {
        DeployError::malformed_catalog(format!("start marker '{}' not found", TABLE_START_MARKER))
    })?;
    let line_start = document[..marker].rfind('\n').map(|i| i + 1).unwrap_or(0);

    let end = document[marker..]
        .find(TABLE_END_MARKER)
        .map(|i| marker + i)
        .ok_or_else(|| {
            DeployError::malformed_catalog(format!("end marker '{}' not found", TABLE_END_MARKER))
        })?;

    Ok(&document[line_start..end])
}

/// Parse a catalog document into entries, preserving catalog order.
///
/// # Errors
///
/// `MalformedCatalog` when either table marker is absent. Individual rows
/// never fail the parse.
pub fn parse(document: &str) -> Result<Vec<DriverEntry>> {
    let window = table_window(document)?;

    let mut lines = window
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    let header = lines
        .next()
        .ok_or_else(|| DeployError::malformed_catalog("table has no header row"))?;
    let columns: Vec<Column> = split_row(header).iter().map(|h| Column::from_header(h)).collect();
    debug!("Catalog columns: {:?}", columns);

    // Separator row (|---|---|)
    lines.next();

    let mut entries = Vec::new();
    for (index, line) in lines.enumerate() {
        if !line.contains('|') {
            warn!("Skipping catalog line {} with no cell separator: {}", index + 1, line);
            continue;
        }

        let cells = split_row(line);
        if cells.len() < columns.len() {
            warn!(
                "Catalog row {} has {} cells, header has {}; missing cells left empty",
                index + 1,
                cells.len(),
                columns.len()
            );
        } else if cells.len() > columns.len() {
            debug!("Catalog row {} has extra cells beyond the header; ignored", index + 1);
        }

        let mut entry = DriverEntry::default();
        for (column, cell) in columns.iter().zip(cells.iter()) {
            column.apply(&mut entry, cell);
        }
        entries.push(entry);
    }

    debug!("Parsed {} catalog entries", entries.len());
    Ok(entries)
}

/// Read and parse a catalog file.
pub fn load_catalog_file(path: &Path) -> Result<Vec<DriverEntry>> {
    let document = std::fs::read_to_string(path).map_err(|e| {
        DeployError::malformed_catalog(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse(&document)
}
