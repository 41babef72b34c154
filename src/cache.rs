//! Catalog Cache Builder ("init" mode)
//!
//! Downloads every package the catalog references into a local cache
//! directory, so the cache can serve as a distribution root.
//!
//! Idempotent by filename: a package whose derived filename already exists in
//! the cache is never downloaded again. Contents are not checksummed.

use crate::error::Result;
use crate::hardware_id::package_file_name;
use crate::platform::Fetcher;
use crate::types::DriverEntry;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Tally of one cache build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheReport {
    pub downloaded: usize,
    pub already_present: usize,
    /// Entries whose chosen URL is empty or has no filename
    pub skipped_no_url: usize,
    pub failed: usize,
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} already cached, {} without URL, {} failed",
            self.downloaded, self.already_present, self.skipped_no_url, self.failed
        )
    }
}

/// Populate `cache_dir` with every entry's package.
///
/// Uses `mirror_url` when `use_mirror` is set, `download_url` otherwise.
/// Individual download failures are logged and counted; only failing to
/// create the cache directory is an error.
pub fn build_cache(
    entries: &[DriverEntry],
    use_mirror: bool,
    cache_dir: &Path,
    fetcher: &dyn Fetcher,
) -> Result<CacheReport> {
    fs::create_dir_all(cache_dir)?;
    let mut report = CacheReport::default();

    for entry in entries {
        let url = entry.chosen_url(use_mirror).trim();
        if url.is_empty() {
            debug!("{}: no {} URL, skipping", entry.hardware_id, if use_mirror { "mirror" } else { "download" });
            report.skipped_no_url += 1;
            continue;
        }

        let Some(file_name) = package_file_name(url) else {
            warn!("{}: cannot derive a filename from '{}'", entry.hardware_id, url);
            report.skipped_no_url += 1;
            continue;
        };

        let target = cache_dir.join(&file_name);
        if target.exists() {
            debug!("{} already cached", file_name);
            report.already_present += 1;
            continue;
        }

        match fetcher.download(url, &target) {
            Ok(bytes) => {
                info!("Cached {} ({} bytes)", file_name, bytes);
                report.downloaded += 1;
            }
            Err(e) => {
                error!("{}: {}", entry.hardware_id, e);
                report.failed += 1;
            }
        }
    }

    info!("Cache build finished: {}", report);
    Ok(report)
}
