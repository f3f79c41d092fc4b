//! Root hiding: overlay a credential-bearing directory with an empty tmpfs.
//!
//! Mount helpers such as `mount.cifs` read credential files from the plugin's
//! home directory. Outside the short window in which a helper runs, the
//! directory is covered by a read-only, size-limited tmpfs so nothing else in
//! the mount namespace can read it.
//!
//! Both operations act on the whole mount namespace. They are only safe while
//! the engine's exclusive lock is held.

use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};
use tracing::{debug, warn};

use crate::error::VolumeError;

/// Default directory hidden by [`RootHider`].
pub const DEFAULT_HIDE_DIR: &str = "/root";

const TMPFS_OPTIONS: &str = "size=1m";

/// Mounts and unmounts the restrictive tmpfs over a fixed directory.
#[derive(Debug, Clone)]
pub struct RootHider {
    dir: PathBuf,
}

impl Default for RootHider {
    fn default() -> Self {
        Self::new(DEFAULT_HIDE_DIR)
    }
}

impl RootHider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cover the directory. Fails (and logs) if it is already hidden.
    pub fn hide(&self) -> Result<(), VolumeError> {
        nix::mount::mount(
            Some("tmpfs"),
            self.dir.as_path(),
            Some("tmpfs"),
            MsFlags::MS_RDONLY | MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            Some(TMPFS_OPTIONS),
        )
        .map_err(|e| {
            warn!(dir = %self.dir.display(), error = %e, "unable to hide directory");
            VolumeError::MountFailed {
                path: self.dir.display().to_string(),
                reason: format!("hide: {e}"),
            }
        })?;
        debug!(dir = %self.dir.display(), "directory hidden");
        Ok(())
    }

    /// Remove the overlay. Fails (and logs) if the directory is not hidden.
    pub fn unhide(&self) -> Result<(), VolumeError> {
        nix::mount::umount2(self.dir.as_path(), MntFlags::empty()).map_err(|e| {
            warn!(dir = %self.dir.display(), error = %e, "unable to unhide directory");
            VolumeError::UnmountFailed {
                path: self.dir.display().to_string(),
                reason: format!("unhide: {e}"),
            }
        })?;
        debug!(dir = %self.dir.display(), "directory unhidden");
        Ok(())
    }
}
