//! Filesystem variants served by `rkvol`.
//!
//! Every variant is a [`VolumeCallback`](libmountvol::VolumeCallback) paired
//! with the [`DriverConfig`](libmountvol::DriverConfig) describing its mount
//! executable and scope.

pub mod cifs;
pub mod glusterfs;
pub mod nfs;
pub mod osmounted;
pub mod s3fs;

pub use cifs::CifsDriver;
pub use glusterfs::GlusterfsDriver;
pub use nfs::NfsDriver;
pub use osmounted::{OsMountedDriver, PackageInstaller};
pub use s3fs::S3fsDriver;

/// Split a comma separated option string, dropping empty entries.
pub(crate) fn split_options(options: &str) -> impl Iterator<Item = &str> {
    options.split(',').map(str::trim).filter(|o| !o.is_empty())
}

/// Append `-o <options>` unless there are no options at all.
pub(crate) fn push_option_flag(args: &mut Vec<String>, options: &[&str]) {
    if !options.is_empty() {
        args.push("-o".to_owned());
        args.push(options.join(","));
    }
}

/// Split a volume name into its leading segment and the remaining sub path.
///
/// `"vol/a/b"` becomes `("vol", Some("a/b"))`.
pub(crate) fn split_volume_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (name, None),
    }
}
