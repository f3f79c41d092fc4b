//! Docker volume plugin protocol messages.
//!
//! Docker posts JSON bodies to `/VolumeDriver.*` endpoints over the plugin's
//! Unix socket. Field names follow Docker's PascalCase wire format; every
//! response carries an `Err` string that is empty on success.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{CreateRequest, MountRequest, Scope, VolumeInfo};

/// Content type used by Docker plugin responses.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.1+json";

// ----- Requests ------------------------------------------------------------

/// Body of `/VolumeDriver.Create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMessage {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Opts", default)]
    pub opts: Option<HashMap<String, String>>,
}

impl From<CreateMessage> for CreateRequest {
    fn from(msg: CreateMessage) -> Self {
        CreateRequest {
            name: msg.name,
            options: msg.opts.unwrap_or_default(),
        }
    }
}

/// Body of `/VolumeDriver.{Get,Remove,Path}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameMessage {
    #[serde(rename = "Name")]
    pub name: String,
}

/// Body of `/VolumeDriver.{Mount,Unmount}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountMessage {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: String,
}

impl From<MountMessage> for MountRequest {
    fn from(msg: MountMessage) -> Self {
        MountRequest {
            name: msg.name,
            id: msg.id,
        }
    }
}

// ----- Responses -----------------------------------------------------------

/// Volume description as Docker expects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginVolume {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Mountpoint", default, skip_serializing_if = "String::is_empty")]
    pub mountpoint: String,
    #[serde(rename = "Status", default)]
    pub status: serde_json::Map<String, serde_json::Value>,
}

impl From<VolumeInfo> for PluginVolume {
    fn from(info: VolumeInfo) -> Self {
        Self {
            name: info.name,
            mountpoint: info.mountpoint,
            status: info.status.to_json(),
        }
    }
}

/// Response to `/Plugin.Activate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    #[serde(rename = "Implements")]
    pub implements: Vec<String>,
}

impl Default for ActivateResponse {
    fn default() -> Self {
        Self {
            implements: vec!["VolumeDriver".to_owned()],
        }
    }
}

/// Generic response carrying only `Err`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrResponse {
    #[serde(rename = "Err")]
    pub err: String,
}

impl ErrResponse {
    pub fn new(err: impl Into<String>) -> Self {
        Self { err: err.into() }
    }
}

/// Response to `/VolumeDriver.{Mount,Path}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountpointResponse {
    #[serde(rename = "Mountpoint")]
    pub mountpoint: String,
    #[serde(rename = "Err")]
    pub err: String,
}

/// Response to `/VolumeDriver.Get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(rename = "Volume")]
    pub volume: PluginVolume,
    #[serde(rename = "Err")]
    pub err: String,
}

/// Response to `/VolumeDriver.List`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(rename = "Volumes")]
    pub volumes: Vec<PluginVolume>,
    #[serde(rename = "Err")]
    pub err: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "Scope")]
    pub scope: Scope,
}

/// Response to `/VolumeDriver.Capabilities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    #[serde(rename = "Capabilities")]
    pub capabilities: Capability,
}
