//! Process-wide plugin settings shared by every variant.
//!
//! Each setting can be given as a flag or through its environment variable;
//! Docker managed plugins usually configure them via `env` in the plugin
//! manifest.

use std::path::PathBuf;

use clap::Args;
use libmountvol::DriverConfig;
use libmountvol::config::{DEFAULT_MOUNT_ROOT, DEFAULT_SOCKET_DIR};
use libmountvol::roothider::DEFAULT_HIDE_DIR;

#[derive(Args, Debug, Clone)]
pub struct PluginOptions {
    /// Directory the plugin socket is created in
    #[arg(long, env = "PLUGIN_SOCKET_DIR", default_value = DEFAULT_SOCKET_DIR, global = true)]
    pub socket_dir: PathBuf,

    /// Directory holding the volume record database
    #[arg(long, env = "PLUGIN_STATE_DIR", default_value = ".", global = true)]
    pub state_dir: PathBuf,

    /// Directory under which per-container mount points are created
    #[arg(long, env = "PLUGIN_MOUNT_ROOT", default_value = DEFAULT_MOUNT_ROOT, global = true)]
    pub mount_root: PathBuf,

    /// Directory kept hidden while no mount helper runs (cifs, osmounted)
    #[arg(long, env = "HIDE_DIR", default_value = DEFAULT_HIDE_DIR, global = true)]
    pub hide_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,
}

impl PluginOptions {
    /// Apply the directory settings to a variant's driver configuration.
    pub fn apply(&self, config: DriverConfig) -> DriverConfig {
        config
            .with_mount_root(&self.mount_root)
            .with_state_dir(&self.state_dir)
    }

    pub fn socket_path(&self, config: &DriverConfig) -> PathBuf {
        config.socket_path(&self.socket_dir)
    }
}
