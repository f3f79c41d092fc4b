//! Lifecycle engine: turns plugin requests into persisted records and
//! mount/unmount operations.
//!
//! # Concurrency
//!
//! The engine owns a single reader-writer lock around its [`VolumeStore`].
//! `get`, `list` and `path` take it shared; every mutating operation takes it
//! exclusively and holds it for the whole operation, including the external
//! mount process. Slow mounts therefore delay every other request on the same
//! engine, which also makes the namespace-wide [`RootHider`](crate::RootHider)
//! safe to use from callbacks.
//!
//! # Failure ordering
//!
//! Records are written and committed only after the OS-level work succeeded.
//! A failed mount may leave its empty mount point directory behind; a failed
//! directory removal after a successful unmount leaves the record marked
//! mounted so the unmount can be retried. Unmount only ever detaches the
//! recorded mount point; a volume that is not recorded as mounted is left
//! alone without touching the host.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use nix::errno::Errno;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::callback::VolumeCallback;
use crate::config::DriverConfig;
use crate::error::VolumeError;
use crate::store::VolumeStore;
use crate::system::{HostSystem, MountSystem};
use crate::types::*;

/// Persistence-backed, lock-guarded volume driver generic over the
/// filesystem policy `C`.
pub struct MountedVolumeDriver<C> {
    config: DriverConfig,
    store: RwLock<VolumeStore>,
    callback: C,
    system: Arc<dyn MountSystem>,
}

impl<C: VolumeCallback> MountedVolumeDriver<C> {
    /// Open the record store named after `config.name` and build a driver
    /// that talks to the host kernel.
    pub fn open(config: DriverConfig, callback: C) -> Result<Self, VolumeError> {
        let store = VolumeStore::open(config.store_path())?;
        info!(
            driver = %config.name,
            store = %store.path().display(),
            scope = %config.scope,
            "volume driver ready",
        );
        Ok(Self {
            config,
            store: RwLock::new(store),
            callback,
            system: Arc::new(HostSystem),
        })
    }

    /// Replace the OS seam, e.g. with a recording fake in tests.
    pub fn with_system(mut self, system: Arc<dyn MountSystem>) -> Self {
        self.system = system;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn callback(&self) -> &C {
        &self.callback
    }

    /// Scope advertised to the Docker daemon.
    pub fn capabilities(&self) -> Scope {
        self.config.scope
    }

    /// Deterministic mount point for one attachment.
    fn mount_point_for(&self, id: &str) -> Result<PathBuf, VolumeError> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.config.mount_root.join(id)),
            _ => Err(VolumeError::InvalidArgument(format!(
                "mount id {id:?} is not a single path segment"
            ))),
        }
    }

    /// Final executable arguments with the mount point in its configured slot.
    fn mount_args(&self, stored: &[String], mount_point: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(stored.len() + 1);
        if self.config.mount_point_after_options {
            args.extend_from_slice(stored);
            args.push(mount_point.to_owned());
        } else {
            args.push(mount_point.to_owned());
            args.extend_from_slice(stored);
        }
        args
    }

    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create(&self, req: &CreateRequest) -> Result<(), VolumeError> {
        let store = self.store.write().await;
        let txn = store.begin(true).await?;

        if txn.get(&req.name)?.is_some() {
            return Err(VolumeError::VolumeAlreadyExists(req.name.clone()));
        }

        self.callback.validate(req)?;
        let args = self.callback.mount_options(req);
        debug!(?args, "computed mount options");

        txn.put(&VolumeRecord::new(&req.name, req.options.clone(), args))?;
        txn.commit()?;

        info!("volume created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, name: &str) -> Result<VolumeInfo, VolumeError> {
        let store = self.store.read().await;
        let txn = store.begin(false).await?;
        txn.get(name)?
            .map(VolumeInfo::from)
            .ok_or_else(|| VolumeError::VolumeNotFound(name.to_owned()))
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<VolumeInfo>, VolumeError> {
        let store = self.store.read().await;
        let txn = store.begin(false).await?;
        Ok(txn.list_all()?.into_iter().map(VolumeInfo::from).collect())
    }

    /// Delete the record. A mounted volume's record may be removed; the
    /// physical mount is left in place.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        let store = self.store.write().await;
        let txn = store.begin(true).await?;

        let record = txn
            .get(name)?
            .ok_or_else(|| VolumeError::VolumeNotFound(name.to_owned()))?;
        if record.is_mounted() {
            warn!(
                mount_point = %record.mount_point,
                "removing record of a mounted volume, mount left in place",
            );
        }

        txn.delete(name)?;
        txn.commit()?;
        info!("volume removed");
        Ok(())
    }

    /// Persisted mount point, empty while the volume is not mounted.
    #[instrument(skip(self))]
    pub async fn path(&self, name: &str) -> Result<String, VolumeError> {
        let store = self.store.read().await;
        let txn = store.begin(false).await?;
        txn.get(name)?
            .map(|record| record.mount_point)
            .ok_or_else(|| VolumeError::VolumeNotFound(name.to_owned()))
    }

    /// Attach the volume at `<mount_root>/<req.id>` and return that path.
    #[instrument(skip(self, req), fields(name = %req.name, id = %req.id))]
    pub async fn mount(&self, req: &MountRequest) -> Result<String, VolumeError> {
        let store = self.store.write().await;
        let txn = store.begin(true).await?;

        let mut record = txn
            .get(&req.name)?
            .ok_or_else(|| VolumeError::VolumeNotFound(req.name.clone()))?;

        let mount_point = self.mount_point_for(&req.id)?;
        let mount_point_str = mount_point.display().to_string();

        if record.is_mounted() {
            if record.mount_point == mount_point_str {
                debug!(mount_point = %mount_point_str, "already mounted for this request");
                return Ok(record.mount_point);
            }
            if self.system.is_mounted(Path::new(&record.mount_point)).await {
                return Err(VolumeError::AlreadyMounted {
                    name: req.name.clone(),
                    mount_point: record.mount_point,
                });
            }
            warn!(
                stale = %record.mount_point,
                "recorded mount point is no longer mounted, mounting afresh",
            );
            match tokio::fs::remove_dir(&record.mount_point).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        stale = %record.mount_point,
                        error = %e,
                        "failed to remove stale mount point",
                    );
                }
            }
        }

        tokio::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&mount_point)
            .await
            .map_err(|e| VolumeError::MountFailed {
                path: mount_point_str.clone(),
                reason: e.to_string(),
            })?;

        self.callback
            .pre_mount(req)
            .await
            .map_err(|e| VolumeError::MountFailed {
                path: mount_point_str.clone(),
                reason: format!("pre-mount: {e}"),
            })?;

        let args = self.mount_args(&record.args, &mount_point_str);
        info!(program = %self.config.mount_executable, ?args, "running mount executable");
        let outcome = {
            // Runs on every exit from this block, including cancellation.
            let _post_mount = scopeguard::guard((), |()| self.callback.post_mount(req));
            self.system
                .run_mount(&self.config.mount_executable, &args)
                .await
        };
        outcome?;

        record.mark_mounted(mount_point_str.clone());
        txn.put(&record)?;
        txn.commit()?;

        info!(mount_point = %mount_point_str, "volume mounted");
        Ok(mount_point_str)
    }

    /// Detach the volume. Unmounting a volume that is not mounted succeeds.
    #[instrument(skip(self, req), fields(name = %req.name, id = %req.id))]
    pub async fn unmount(&self, req: &UnmountRequest) -> Result<(), VolumeError> {
        let store = self.store.write().await;
        let txn = store.begin(true).await?;

        let mut record = txn
            .get(&req.name)?
            .ok_or_else(|| VolumeError::VolumeNotFound(req.name.clone()))?;

        // Only the recorded mount point is ever unmounted. A directory derived
        // from the request id may belong to another volume's live mount.
        if !record.is_mounted() {
            debug!("not mounted, nothing to unmount");
            return Ok(());
        }

        let mount_point = if record.mount_point.is_empty() {
            self.mount_point_for(&req.id)?
        } else {
            PathBuf::from(&record.mount_point)
        };
        let mount_point_str = mount_point.display().to_string();

        match self.system.unmount(&mount_point) {
            Ok(()) => {}
            Err(Errno::EINVAL) => {
                warn!(mount_point = %mount_point_str, "mount point was not mounted");
            }
            Err(Errno::ENOENT) => {
                warn!(mount_point = %mount_point_str, "mount point no longer exists");
            }
            Err(e) => {
                return Err(VolumeError::UnmountFailed {
                    path: mount_point_str,
                    reason: e.to_string(),
                });
            }
        }

        match tokio::fs::remove_dir(&mount_point).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(mount_point = %mount_point_str, "mount point directory already gone");
            }
            Err(e) => {
                return Err(VolumeError::UnmountFailed {
                    path: mount_point_str,
                    reason: format!("remove mount point: {e}"),
                });
            }
        }

        record.mark_unmounted();
        txn.put(&record)?;
        txn.commit()?;

        info!(mount_point = %mount_point_str, "volume unmounted");
        Ok(())
    }
}
