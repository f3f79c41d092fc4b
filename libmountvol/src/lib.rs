//! # libmountvol — mounted-volume lifecycle engine for Docker volume plugins
//!
//! `libmountvol` implements the part shared by every mount-helper based
//! Docker volume plugin: a persistence-backed, lock-guarded driver that turns
//! plugin requests into records and `mount`/`umount` operations, while the
//! filesystem-specific option handling is delegated to a [`VolumeCallback`].
//! It follows the RK8s conventions (Tokio async runtime, `tracing` for
//! observability, `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Data model: `VolumeRecord`, `VolumeStatus`, `Scope`, requests. |
//! | [`error`] | [`VolumeError`] enum covering all failure modes. |
//! | [`store`] | SQLite-backed transactional record store. |
//! | [`roothider`] | tmpfs overlay hiding credential directories. |
//! | [`callback`] | [`VolumeCallback`] trait for per-filesystem policy. |
//! | [`bootstrap`] | One-shot gate for background helper installation. |
//! | [`system`] | [`MountSystem`] seam over `mount` executables and `umount(2)`. |
//! | [`config`] | [`DriverConfig`] static configuration. |
//! | [`engine`] | [`MountedVolumeDriver`] lifecycle engine. |
//! | [`message`] | Docker plugin protocol bodies. |
//! | [`transport`] | Unix-socket HTTP server built on `axum`. |

pub mod bootstrap;
pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod roothider;
pub mod store;
pub mod system;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use bootstrap::{BootstrapGate, BootstrapSignal};
pub use callback::VolumeCallback;
pub use config::DriverConfig;
pub use engine::MountedVolumeDriver;
pub use error::VolumeError;
pub use roothider::RootHider;
pub use system::{HostSystem, MountSystem, run_command};
pub use transport::PluginServer;
pub use types::*;
