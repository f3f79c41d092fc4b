//! CIFS/SMB volumes mounted with `mount -t cifs`.
//!
//! Credentials are never passed as options. Instead a file named after the
//! volume is looked up under the credential directory, which normally lives
//! inside the hidden root directory and is only visible while a mount helper
//! runs.

use std::path::PathBuf;

use async_trait::async_trait;
use libmountvol::{
    CreateRequest, DriverConfig, MountRequest, RootHider, Scope, VolumeCallback, VolumeError,
};
use tracing::{debug, warn};

use super::{push_option_flag, split_options};

pub const NAME: &str = "cifs";

pub fn driver_config() -> DriverConfig {
    DriverConfig::new(NAME, "mount", true, Scope::Global)
}

#[derive(Debug, Clone, Default)]
pub struct CifsDriver {
    credential_path: Option<PathBuf>,
    hider: Option<RootHider>,
}

impl CifsDriver {
    pub fn new(credential_path: Option<PathBuf>) -> Self {
        Self {
            credential_path,
            hider: None,
        }
    }

    /// Hide the credential directory outside of mount helper runs.
    pub fn with_hider(mut self, hider: RootHider) -> Self {
        self.hider = Some(hider);
        self
    }

    /// Credential file for `volume_name`; slashes become `@` so nested share
    /// paths map to a single file name.
    pub fn credentials_file(&self, volume_name: &str) -> Option<PathBuf> {
        self.credential_path
            .as_deref()
            .map(|dir| dir.join(volume_name.replace('/', "@")))
    }

    fn existing_credentials(&self, volume_name: &str) -> Option<PathBuf> {
        let file = self.credentials_file(volume_name)?;
        self.unhide();
        let found = file.is_file();
        self.hide();

        if !found {
            warn!(
                path = %file.display(),
                "credential file not found, no implicit credentials will be passed",
            );
            return None;
        }
        debug!(path = %file.display(), "using credential file");
        Some(file)
    }

    // Hider failures are logged by the hider and do not abort the request.
    fn unhide(&self) {
        if let Some(hider) = &self.hider {
            hider.unhide().ok();
        }
    }

    fn hide(&self) {
        if let Some(hider) = &self.hider {
            hider.hide().ok();
        }
    }
}

#[async_trait]
impl VolumeCallback for CifsDriver {
    fn validate(&self, _req: &CreateRequest) -> Result<(), VolumeError> {
        Ok(())
    }

    fn mount_options(&self, req: &CreateRequest) -> Vec<String> {
        let mut options: Vec<String> = split_options(req.option("cifsopts").unwrap_or_default())
            .map(str::to_owned)
            .collect();
        if let Some(file) = self.existing_credentials(&req.name) {
            options.push(format!("credentials={}", file.display()));
        }

        let options: Vec<&str> = options.iter().map(String::as_str).collect();
        let mut args = vec!["-t".to_owned(), "cifs".to_owned()];
        push_option_flag(&mut args, &options);
        args
    }

    async fn pre_mount(&self, _req: &MountRequest) -> Result<(), VolumeError> {
        self.unhide();
        Ok(())
    }

    fn post_mount(&self, _req: &MountRequest) {
        self.hide();
    }
}
