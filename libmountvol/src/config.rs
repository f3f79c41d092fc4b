//! Static, process-lifetime engine configuration.

use std::path::PathBuf;

use crate::types::Scope;

/// Directory under which per-attachment mount points are created.
pub const DEFAULT_MOUNT_ROOT: &str = "/var/lib/docker-volumes";

/// Directory Docker scans for plugin sockets.
pub const DEFAULT_SOCKET_DIR: &str = "/run/docker/plugins";

/// Configuration fixed when a [`MountedVolumeDriver`](crate::MountedVolumeDriver)
/// is built.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Driver identity: names the socket and the store file.
    pub name: String,
    /// Executable invoked to attach storage, e.g. `mount` or `glusterfs`.
    pub mount_executable: String,
    /// Place the mount point after the stored arguments instead of before.
    pub mount_point_after_options: bool,
    pub scope: Scope,
    pub mount_root: PathBuf,
    /// Directory holding `<name>.db`.
    pub state_dir: PathBuf,
}

impl DriverConfig {
    pub fn new(
        name: impl Into<String>,
        mount_executable: impl Into<String>,
        mount_point_after_options: bool,
        scope: Scope,
    ) -> Self {
        Self {
            name: name.into(),
            mount_executable: mount_executable.into(),
            mount_point_after_options,
            scope,
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            state_dir: PathBuf::from("."),
        }
    }

    pub fn with_mount_root(mut self, mount_root: impl Into<PathBuf>) -> Self {
        self.mount_root = mount_root.into();
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    /// Path of the record store file.
    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join(format!("{}.db", self.name))
    }

    /// Socket path under `socket_dir` for this driver.
    pub fn socket_path(&self, socket_dir: impl Into<PathBuf>) -> PathBuf {
        socket_dir.into().join(format!("{}.sock", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths() {
        let config = DriverConfig::new("nfs", "mount", true, Scope::Global)
            .with_state_dir("/var/lib/rkvol");
        assert_eq!(config.store_path(), PathBuf::from("/var/lib/rkvol/nfs.db"));
        assert_eq!(
            config.socket_path(DEFAULT_SOCKET_DIR),
            PathBuf::from("/run/docker/plugins/nfs.sock")
        );
        assert_eq!(config.mount_root, PathBuf::from(DEFAULT_MOUNT_ROOT));
    }
}
