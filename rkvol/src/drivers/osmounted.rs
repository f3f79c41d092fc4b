//! Volumes mounted with `mount -t <MOUNT_TYPE>` after the mount helper has
//! been installed from the distribution's package repositories.
//!
//! Installation runs in the background at start-up so the plugin socket is
//! available immediately; mounts wait on the bootstrap gate until it is done.

use async_trait::async_trait;
use libmountvol::{
    BootstrapGate, BootstrapSignal, CreateRequest, DriverConfig, MountRequest, RootHider, Scope,
    VolumeCallback, VolumeError, run_command,
};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use super::{push_option_flag, split_options};

pub const NAME: &str = "osmounted";

pub fn driver_config() -> DriverConfig {
    DriverConfig::new(NAME, "mount", true, Scope::Local)
}

#[derive(Debug, Clone)]
pub struct OsMountedDriver {
    mount_type: String,
    mount_options: String,
    gate: BootstrapGate,
    hider: Option<RootHider>,
}

impl OsMountedDriver {
    pub fn new(
        mount_type: impl Into<String>,
        mount_options: impl Into<String>,
        gate: BootstrapGate,
    ) -> Self {
        Self {
            mount_type: mount_type.into(),
            mount_options: mount_options.into(),
            gate,
            hider: None,
        }
    }

    pub fn with_hider(mut self, hider: RootHider) -> Self {
        self.hider = Some(hider);
        self
    }
}

#[async_trait]
impl VolumeCallback for OsMountedDriver {
    fn validate(&self, req: &CreateRequest) -> Result<(), VolumeError> {
        if req.option("device").is_none() {
            return Err(VolumeError::InvalidArgument(
                "device is required in driver_opts".to_owned(),
            ));
        }
        Ok(())
    }

    fn mount_options(&self, req: &CreateRequest) -> Vec<String> {
        let options: Vec<_> = split_options(&self.mount_options).collect();
        let mut args = vec!["-t".to_owned(), self.mount_type.clone()];
        push_option_flag(&mut args, &options);
        args.push(req.option("device").unwrap_or_default().to_owned());
        args
    }

    async fn pre_mount(&self, _req: &MountRequest) -> Result<(), VolumeError> {
        self.gate.wait().await?;
        if let Some(hider) = &self.hider {
            hider.unhide().ok();
        }
        Ok(())
    }

    fn post_mount(&self, _req: &MountRequest) {
        if let Some(hider) = &self.hider {
            hider.hide().ok();
        }
    }
}

/// Installs the packages providing the mount helper, then runs an optional
/// post-install shell snippet.
#[derive(Debug, Clone)]
pub struct PackageInstaller {
    packages: Vec<String>,
    post_install: Option<String>,
    installer: String,
    shell: String,
}

impl PackageInstaller {
    pub fn new(packages: Vec<String>, post_install: Option<String>) -> Self {
        Self {
            packages,
            post_install: post_install.filter(|cmd| !cmd.trim().is_empty()),
            installer: "yum".to_owned(),
            shell: "/bin/bash".to_owned(),
        }
    }

    #[instrument(skip(self), fields(packages = ?self.packages))]
    pub async fn run(&self) -> Result<(), VolumeError> {
        let mut args = vec!["install".to_owned(), "-y".to_owned()];
        args.extend(self.packages.iter().cloned());
        run_command(&self.installer, &args).await?;
        info!(installer = %self.installer, "packages installed");

        if let Some(cmd) = &self.post_install {
            run_command(&self.shell, &["-c".to_owned(), cmd.clone()]).await?;
            info!("post-install command completed");
        }
        Ok(())
    }

    /// Run in the background and open the gate on success. On failure the
    /// signal is dropped, so every later mount fails instead of waiting.
    pub fn spawn(self, signal: BootstrapSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.run().await {
                Ok(()) => signal.complete(),
                Err(e) => error!(error = %e, "mount helper installation failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn installer(program: &str, post_install: Option<&str>) -> PackageInstaller {
        PackageInstaller {
            packages: vec!["nfs-utils".to_owned()],
            post_install: post_install.map(str::to_owned),
            installer: program.to_owned(),
            shell: "sh".to_owned(),
        }
    }

    #[test]
    fn device_is_required() {
        let driver = OsMountedDriver::new("nfs4", "", BootstrapGate::ready());
        assert!(driver.validate(&CreateRequest::new("vol")).is_err());
        driver
            .validate(&CreateRequest::new("vol").with_option("device", "nas:/export"))
            .unwrap();
    }

    #[test]
    fn mount_options_use_process_settings() {
        let driver = OsMountedDriver::new("nfs4", "rw,noatime", BootstrapGate::ready());
        let req = CreateRequest::new("vol").with_option("device", "nas:/export");
        assert_eq!(
            driver.mount_options(&req),
            ["-t", "nfs4", "-o", "rw,noatime", "nas:/export"]
        );

        let bare = OsMountedDriver::new("xfs", "", BootstrapGate::ready());
        assert_eq!(bare.mount_options(&req), ["-t", "xfs", "nas:/export"]);
    }

    #[test]
    fn blank_post_install_is_skipped() {
        let installer = PackageInstaller::new(vec!["nfs-utils".to_owned()], Some("  ".into()));
        assert!(installer.post_install.is_none());
    }

    #[tokio::test]
    async fn pre_mount_waits_for_installation() {
        let (signal, gate) = libmountvol::bootstrap::gate();
        let driver = OsMountedDriver::new("nfs4", "", gate);
        let req = MountRequest::new("vol", "abc");

        let pending = tokio::time::timeout(Duration::from_millis(50), driver.pre_mount(&req)).await;
        assert!(pending.is_err(), "pre_mount returned before installation");

        installer("true", Some("exit 0")).spawn(signal).await.unwrap();
        driver.pre_mount(&req).await.unwrap();
    }

    #[tokio::test]
    async fn failed_installation_fails_mounts() {
        let (signal, gate) = libmountvol::bootstrap::gate();
        let driver = OsMountedDriver::new("nfs4", "", gate);

        installer("false", None).spawn(signal).await.unwrap();
        let err = driver
            .pre_mount(&MountRequest::new("vol", "abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, VolumeError::Internal(_)));
    }

    #[tokio::test]
    async fn failed_post_install_is_reported() {
        let err = installer("true", Some("exit 3")).run().await.unwrap_err();
        assert!(matches!(err, VolumeError::CommandFailed { .. }));
    }
}
