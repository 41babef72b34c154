//! Scoped distribution-share access
//!
//! `ShareGuard` mounts the distribution root on creation and unmounts it when
//! dropped, so every exit path (success, fatal error, early return) releases
//! the share. Local distribution roots are used as-is and never unmounted.

use crate::error::{DeployError, Result};
use crate::platform::{ShareMounter, is_unc_path};
use crate::types::Credentials;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Holds a mounted distribution root for the lifetime of a run.
pub struct ShareGuard<'a> {
    mounter: &'a dyn ShareMounter,
    root: PathBuf,
    mounted: bool,
}

impl<'a> ShareGuard<'a> {
    /// Mount `distribution_path` (when it is a UNC share) and return the guard.
    ///
    /// # Errors
    ///
    /// `ShareUnavailable` when the mount fails or a local root does not exist.
    /// Reconciliation must not proceed in that case.
    pub fn acquire(
        mounter: &'a dyn ShareMounter,
        distribution_path: &str,
        credentials: &Credentials,
    ) -> Result<Self> {
        if is_unc_path(distribution_path) {
            let root = mounter.mount(distribution_path, credentials)?;
            Ok(Self { mounter, root, mounted: true })
        } else {
            let root = PathBuf::from(distribution_path);
            if !root.is_dir() {
                return Err(DeployError::share_unavailable(format!(
                    "distribution root {} does not exist",
                    root.display()
                )));
            }
            info!("Using local distribution root {}", root.display());
            Ok(Self { mounter, root, mounted: false })
        }
    }

    /// Local path of the distribution root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for ShareGuard<'_> {
    fn drop(&mut self) {
        if !self.mounted {
            return;
        }
        if let Err(e) = self.mounter.unmount(&self.root) {
            warn!("Failed to unmount {}: {}", self.root.display(), e);
        }
    }
}
