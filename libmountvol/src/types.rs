//! Core data model: volume records, status, scope and requests.
//!
//! [`VolumeRecord`] is the only persisted entity. Everything else is a
//! request-scoped view handed to callbacks or returned to the protocol layer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Whether the driver advertises its volumes as host-local or cluster-wide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Volumes only exist on this host.
    #[default]
    Local,
    /// Volumes are reachable from every host in the swarm.
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// A value in the free-form part of a volume status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusValue {
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl StatusValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            StatusValue::Flag(b) => serde_json::Value::Bool(*b),
            StatusValue::Text(s) => serde_json::Value::String(s.clone()),
            StatusValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
        }
    }
}

/// Status mapping reported for a volume.
///
/// `mounted` is always present; `extra` holds implementation-defined keys and
/// is persisted verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeStatus {
    pub mounted: bool,
    pub extra: BTreeMap<String, StatusValue>,
}

impl VolumeStatus {
    /// Render the status as the JSON object Docker expects in `Status`.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map: serde_json::Map<String, serde_json::Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        map.insert("mounted".to_owned(), serde_json::Value::Bool(self.mounted));
        map
    }
}

// ---------------------------------------------------------------------------
// Volume record
// ---------------------------------------------------------------------------

/// Persistent record for a single volume, keyed by `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeRecord {
    /// Unique volume name; immutable once created.
    pub name: String,
    /// Raw creation-time options supplied by the caller.
    pub options: HashMap<String, String>,
    /// Current mount point, empty while not mounted.
    pub mount_point: String,
    /// Mount arguments computed at creation, excluding the mount point.
    pub args: Vec<String>,
    pub status: VolumeStatus,
}

impl VolumeRecord {
    /// Build a freshly created, unmounted record.
    pub fn new(
        name: impl Into<String>,
        options: HashMap<String, String>,
        args: Vec<String>,
    ) -> Self {
        let mut status = VolumeStatus::default();
        status
            .extra
            .insert("args".to_owned(), StatusValue::List(args.clone()));
        Self {
            name: name.into(),
            options,
            mount_point: String::new(),
            args,
            status,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.status.mounted
    }

    /// Record a successful mount at `mount_point`.
    pub fn mark_mounted(&mut self, mount_point: impl Into<String>) {
        self.mount_point = mount_point.into();
        self.status.mounted = true;
    }

    /// Record that the volume is no longer attached.
    pub fn mark_unmounted(&mut self) {
        self.mount_point.clear();
        self.status.mounted = false;
    }
}

/// Read view of a volume returned by `get` and `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub options: HashMap<String, String>,
    pub mountpoint: String,
    pub status: VolumeStatus,
}

impl From<VolumeRecord> for VolumeInfo {
    fn from(record: VolumeRecord) -> Self {
        Self {
            name: record.name,
            options: record.options,
            mountpoint: record.mount_point,
            status: record.status,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to create a new volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    /// Driver options (`docker volume create -o key=value`).
    pub options: HashMap<String, String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Look up an option by key.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Request to attach or detach a volume for one consumer.
///
/// `id` identifies the attachment (a container mount request), not the
/// volume, so two consumers of the same volume get distinct mount points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountRequest {
    pub name: String,
    pub id: String,
}

impl MountRequest {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Unmount carries the same fields as mount.
pub type UnmountRequest = MountRequest;
