//! OS and process seam used by the lifecycle engine.
//!
//! [`HostSystem`] shells out to the real mount executable and calls
//! `umount(2)`. Keeping these behind [`MountSystem`] lets the engine's
//! lifecycle be tested without privileges.

use std::path::Path;

use async_trait::async_trait;
use nix::mount::MntFlags;
use tracing::{debug, instrument, warn};

use crate::error::VolumeError;

/// Privileged operations the engine performs on the host.
#[async_trait]
pub trait MountSystem: Send + Sync {
    /// Run `program` with `args` to completion. A spawn failure or non-zero
    /// exit is a [`VolumeError::CommandFailed`] carrying the captured output.
    async fn run_mount(&self, program: &str, args: &[String]) -> Result<(), VolumeError>;

    /// Unmount `path`.
    fn unmount(&self, path: &Path) -> nix::Result<()>;

    /// Whether `path` is currently a mount point.
    async fn is_mounted(&self, path: &Path) -> bool;
}

/// [`MountSystem`] backed by the host kernel and `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSystem;

#[async_trait]
impl MountSystem for HostSystem {
    async fn run_mount(&self, program: &str, args: &[String]) -> Result<(), VolumeError> {
        run_command(program, args).await
    }

    fn unmount(&self, path: &Path) -> nix::Result<()> {
        nix::mount::umount2(path, MntFlags::empty())
    }

    async fn is_mounted(&self, path: &Path) -> bool {
        is_mountpoint(path).await
    }
}

/// Run `program` to completion, folding stdout and stderr into the error on
/// failure.
#[instrument(skip(args))]
pub async fn run_command(program: &str, args: &[String]) -> Result<(), VolumeError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| VolumeError::CommandFailed {
            program: program.to_owned(),
            reason: format!("spawn: {e}"),
        })?;

    if output.status.success() {
        debug!(program, ?args, "command succeeded");
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim().to_owned();
    warn!(program, status = %output.status, output = %combined, "command failed");
    Err(VolumeError::CommandFailed {
        program: program.to_owned(),
        reason: if combined.is_empty() {
            output.status.to_string()
        } else {
            format!("{}: {combined}", output.status)
        },
    })
}

/// Return `true` if `path` is listed as a mount point in `/proc/self/mounts`.
///
/// `/proc/self/mounts` escapes whitespace in octal; mount roots used by the
/// engine never contain whitespace.
pub async fn is_mountpoint(path: &Path) -> bool {
    let contents = match tokio::fs::read_to_string("/proc/self/mounts").await {
        Ok(c) => c,
        Err(_) => return false,
    };
    let Some(path) = path.to_str() else {
        return false;
    };
    // Format: <device> <mountpoint> <fstype> <options> <dump> <pass>
    contents
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(path))
}
