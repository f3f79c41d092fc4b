//! Unix-socket transport for the Docker volume plugin protocol.
//!
//! [`PluginServer`] exposes a [`MountedVolumeDriver`](crate::MountedVolumeDriver)
//! as the HTTP/JSON endpoints Docker calls on `/run/docker/plugins/*.sock`.

pub mod server;

pub use server::PluginServer;
