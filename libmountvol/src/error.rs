//! Volume engine error types.
//!
//! All errors in the `libmountvol` crate are represented by the
//! [`VolumeError`] enum. Every variant carries a human-readable message
//! because the plugin protocol only ever forwards the rendered string back to
//! the Docker daemon.

use thiserror::Error;

/// Unified error type for volume lifecycle operations.
#[derive(Debug, Error, Clone)]
pub enum VolumeError {
    /// The requested volume already exists.
    #[error("volume {0} already exists")]
    VolumeAlreadyExists(String),

    /// The requested volume was not found.
    #[error("volume {0} does not exist")]
    VolumeNotFound(String),

    /// The volume is attached under a different mount request.
    #[error("volume {name} is already mounted at {mount_point}")]
    AlreadyMounted {
        /// Volume name.
        name: String,
        /// Live mount point of the existing attachment.
        mount_point: String,
    },

    /// The caller supplied an invalid argument or option set.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A mount operation failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The external mount executable could not be spawned or exited non-zero.
    #[error("command {program} failed: {reason}")]
    CommandFailed {
        /// Executable that was invoked.
        program: String,
        /// Exit status and captured output.
        reason: String,
    },

    /// The record store returned an error.
    #[error("store error: {0}")]
    Store(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VolumeError {
    /// Create a [`VolumeError::Store`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn store<E: std::fmt::Display>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Create a [`VolumeError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// Whether the error reports an unknown volume name.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::VolumeNotFound(_))
    }

    /// Whether the error reports a clash with existing state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VolumeAlreadyExists(_) | Self::AlreadyMounted { .. }
        )
    }
}

impl From<rusqlite::Error> for VolumeError {
    fn from(e: rusqlite::Error) -> Self {
        Self::store(e)
    }
}

impl From<bincode::Error> for VolumeError {
    fn from(e: bincode::Error) -> Self {
        Self::Store(format!("record encoding: {e}"))
    }
}
