//! S3 buckets mounted through `s3fs`.
//!
//! `s3fs` takes the mount point before its options, and the bucket (plus an
//! optional service path) is derived from the volume name.

use libmountvol::{CreateRequest, DriverConfig, Scope, VolumeCallback, VolumeError};

use super::{split_options, split_volume_name};

pub const NAME: &str = "s3fs";

pub fn driver_config() -> DriverConfig {
    DriverConfig::new(NAME, "s3fs", false, Scope::Local)
}

#[derive(Debug, Clone, Default)]
pub struct S3fsDriver {
    default_options: String,
}

impl S3fsDriver {
    pub fn new(default_options: impl Into<String>) -> Self {
        Self {
            default_options: default_options.into(),
        }
    }
}

/// Append `bucket=` and, for nested names, `servicepath=`.
pub fn append_bucket_options(options: &mut Vec<String>, volume_name: &str) {
    let (bucket, service_path) = split_volume_name(volume_name);
    options.push(format!("bucket={bucket}"));
    if let Some(path) = service_path {
        options.push(format!("servicepath=/{path}"));
    }
}

impl VolumeCallback for S3fsDriver {
    fn validate(&self, _req: &CreateRequest) -> Result<(), VolumeError> {
        Ok(())
    }

    fn mount_options(&self, req: &CreateRequest) -> Vec<String> {
        let options = req
            .option("s3fsopts")
            .unwrap_or(self.default_options.as_str());
        let mut options: Vec<String> = split_options(options).map(str::to_owned).collect();
        append_bucket_options(&mut options, &req.name);
        vec!["-o".to_owned(), options.join(",")]
    }
}
