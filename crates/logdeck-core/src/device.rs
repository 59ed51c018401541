//! Device domain types
//!
//! A [`Device`] is one remote log-producing endpoint tracked by the registry.
//! Its `status` is only ever mutated by the owning session's state machine;
//! every other component works from snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::LogStats;

/// Default port for network (adb-over-tcp) devices
pub const DEFAULT_DEVICE_PORT: u16 = 5555;

/// Fixed color palette assigned to devices round-robin at creation
pub const DEVICE_COLORS: &[&str] = &[
    "#3fb950", "#58a6ff", "#f0883e", "#a371f7", "#56d4dd", "#f9c513", "#f85149", "#d29922",
];

/// Connection state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Offline,
    Connecting,
    Online,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Offline
    }
}

/// How the device is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// adb-over-tcp, id is `host:port`
    Network,
    /// Directly attached (USB), id is the backend-assigned serial
    Direct,
}

/// A remote log-producing endpoint tracked by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Primary key, immutable after creation
    pub id: String,

    /// Backend-reported display name
    pub name: String,

    /// User-assigned display name, takes precedence over `name`
    #[serde(default)]
    pub nickname: Option<String>,

    pub connection_type: ConnectionType,

    pub status: DeviceStatus,

    /// Palette color, stable for the device's lifetime in the registry
    pub color: String,

    pub stats: LogStats,

    /// Timestamp of the most recent successfully parsed record
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Create a new device with the given palette color.
    ///
    /// Starts offline with a placeholder name; the backend-reported name is
    /// filled in by the session on first successful connect.
    pub fn new(id: impl Into<String>, connection_type: ConnectionType, color: &str) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            nickname: None,
            connection_type,
            status: DeviceStatus::Offline,
            color: color.to_string(),
            stats: LogStats::default(),
            last_seen: None,
        }
    }

    /// Display name with nickname precedence
    pub fn display_name(&self) -> &str {
        match &self.nickname {
            Some(nick) if !nick.is_empty() => nick,
            _ => &self.name,
        }
    }
}

/// A directly-attached device as reported by the backend's enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDevice {
    /// Backend-assigned serial
    pub serial: String,

    /// Product model, when the backend reports one
    #[serde(default)]
    pub model: Option<String>,

    /// Raw backend state string (`device`, `offline`, `unauthorized`, ...)
    pub state: String,
}

/// Normalize a network device id to `host:port` form.
///
/// A bare address gets the default port appended; an id that already
/// carries a port is returned unchanged.
pub fn normalize_device_id(id: &str) -> String {
    if id.contains(':') {
        id.to_string()
    } else {
        format!("{}:{}", id, DEFAULT_DEVICE_PORT)
    }
}
