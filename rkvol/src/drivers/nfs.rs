//! NFS volumes mounted with `mount -t nfs`.

use libmountvol::{CreateRequest, DriverConfig, Scope, VolumeCallback, VolumeError};

use super::{push_option_flag, split_options};

pub const NAME: &str = "nfs";

pub fn driver_config() -> DriverConfig {
    DriverConfig::new(NAME, "mount", true, Scope::Global)
}

/// `device` names the export (`server:/path`); `nfsopts` replaces the
/// process-wide default options.
#[derive(Debug, Clone, Default)]
pub struct NfsDriver {
    default_options: String,
}

impl NfsDriver {
    pub fn new(default_options: impl Into<String>) -> Self {
        Self {
            default_options: default_options.into(),
        }
    }
}

impl VolumeCallback for NfsDriver {
    fn validate(&self, req: &CreateRequest) -> Result<(), VolumeError> {
        if req.option("device").is_none() {
            return Err(VolumeError::InvalidArgument(
                "device is required in driver_opts".to_owned(),
            ));
        }
        Ok(())
    }

    fn mount_options(&self, req: &CreateRequest) -> Vec<String> {
        let options = req.option("nfsopts").unwrap_or(self.default_options.as_str());
        let options: Vec<_> = split_options(options).collect();

        let mut args = vec!["-t".to_owned(), "nfs".to_owned()];
        push_option_flag(&mut args, &options);
        args.push(req.option("device").unwrap_or_default().to_owned());
        args
    }
}
