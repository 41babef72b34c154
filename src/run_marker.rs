//! "Already ran on this host" marker
//!
//! The run log doubles as the marker: if it exists, a previous deployment
//! completed (or at least started) here and the default run is skipped unless
//! forced. The check must happen before logging opens the file.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RunMarker {
    path: PathBuf,
}

impl RunMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.is_file()
    }

    /// Whether the default run should be skipped.
    pub fn should_skip(&self, force: bool) -> bool {
        !force && self.is_present()
    }
}
