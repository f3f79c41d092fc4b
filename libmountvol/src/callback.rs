//! Filesystem-specific policy consulted by the lifecycle engine.
//!
//! Each plugin variant (NFS, CIFS, GlusterFS, ...) implements
//! [`VolumeCallback`]; the engine itself never looks at option keys.

use async_trait::async_trait;

use crate::error::VolumeError;
use crate::types::{CreateRequest, MountRequest};

/// Per-filesystem hooks invoked by [`MountedVolumeDriver`](crate::MountedVolumeDriver).
#[async_trait]
pub trait VolumeCallback: Send + Sync {
    /// Reject creation requests with missing or mutually exclusive options.
    ///
    /// Called once during `create`, before anything is persisted.
    fn validate(&self, req: &CreateRequest) -> Result<(), VolumeError>;

    /// Build the mount executable arguments, excluding the mount point.
    ///
    /// Must be deterministic: the result is persisted at creation and replayed
    /// by every later mount of the volume.
    fn mount_options(&self, req: &CreateRequest) -> Vec<String>;

    /// Runs right before the mount executable. An error aborts the mount.
    async fn pre_mount(&self, _req: &MountRequest) -> Result<(), VolumeError> {
        Ok(())
    }

    /// Runs after every mount attempt that got past [`pre_mount`](Self::pre_mount),
    /// whether the executable succeeded or not. Failures are logged by the
    /// implementation.
    fn post_mount(&self, _req: &MountRequest) {}
}
