//! GlusterFS volumes mounted with the native `glusterfs` client.
//!
//! The volume name selects the Gluster volume and, after the first `/`, a
//! sub directory mounted with `--subdir-mount`. Servers come either from the
//! process-wide `SERVERS` list or from the `servers` option. `glusteropts`
//! passes a raw argument string instead and excludes both.

use libmountvol::{CreateRequest, DriverConfig, Scope, VolumeCallback, VolumeError};

use super::{split_options, split_volume_name};

pub const NAME: &str = "glusterfs";

pub fn driver_config() -> DriverConfig {
    DriverConfig::new(NAME, "glusterfs", true, Scope::Local)
}

#[derive(Debug, Clone, Default)]
pub struct GlusterfsDriver {
    servers: Vec<String>,
}

impl GlusterfsDriver {
    pub fn new(servers: impl IntoIterator<Item = String>) -> Self {
        Self {
            servers: servers.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}

/// Append `--volfile-id` and, for nested names, `--subdir-mount`.
pub fn append_volume_options(args: &mut Vec<String>, volume_name: &str) {
    let (volume, subdir) = split_volume_name(volume_name);
    args.push(format!("--volfile-id={volume}"));
    if let Some(subdir) = subdir {
        args.push(format!("--subdir-mount=/{subdir}"));
    }
}

fn push_servers<'a>(args: &mut Vec<String>, servers: impl IntoIterator<Item = &'a str>) {
    for server in servers {
        args.push("-s".to_owned());
        args.push(server.to_owned());
    }
}

impl VolumeCallback for GlusterfsDriver {
    fn validate(&self, req: &CreateRequest) -> Result<(), VolumeError> {
        let servers_in_opts = req.option("servers").is_some();
        let glusteropts_in_opts = req.option("glusteropts").is_some();

        if !self.servers.is_empty() && (servers_in_opts || glusteropts_in_opts) {
            return Err(VolumeError::InvalidArgument(
                "SERVERS is set, options are not allowed".to_owned(),
            ));
        }
        if servers_in_opts && glusteropts_in_opts {
            return Err(VolumeError::InvalidArgument(
                "servers is set, glusteropts are not allowed".to_owned(),
            ));
        }
        if self.servers.is_empty() && !servers_in_opts && !glusteropts_in_opts {
            return Err(VolumeError::InvalidArgument(
                "one of SERVERS, driver_opts.servers or driver_opts.glusteropts must be specified"
                    .to_owned(),
            ));
        }
        Ok(())
    }

    fn mount_options(&self, req: &CreateRequest) -> Vec<String> {
        let mut args = Vec::new();
        if !self.servers.is_empty() {
            push_servers(&mut args, self.servers.iter().map(String::as_str));
            append_volume_options(&mut args, &req.name);
        } else if let Some(servers) = req.option("servers") {
            push_servers(&mut args, split_options(servers));
            append_volume_options(&mut args, &req.name);
        } else {
            args.extend(
                req.option("glusteropts")
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_owned),
            );
        }
        args
    }
}
