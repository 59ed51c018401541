//! Observer wire vocabulary
//!
//! Inbound [`Command`]s are JSON objects with an `action` tag; outbound
//! [`ServerEvent`]s are `{"type": ..., "data": ...}` envelopes. Both sides
//! are plain serde-tagged enums so the dispatcher and the observer loop can
//! stay free of hand-written JSON plumbing.
//!
//! Unknown actions deliberately fail deserialization; the dispatcher treats
//! that as "ignore", per the command-error policy.

use serde::{Deserialize, Serialize};

use crate::device::{ConnectionType, Device, UsbDevice};
use crate::record::{LogRecord, LogStats};

/// Inbound observer command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Trigger a network discovery scan
    Scan,

    /// Register a device (idempotent). Network is the default; bare
    /// network addresses get the default port, direct serials are kept
    /// verbatim.
    AddDevice {
        device_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_type: Option<ConnectionType>,
    },

    Connect { device_id: String },

    Disconnect { device_id: String },

    Remove { device_id: String },

    SetNickname { device_id: String, nickname: String },

    /// Enumerate directly-attached devices (direct reply, not broadcast)
    GetUsbDevices,

    /// Promote a directly-attached device to network mode
    EnableWifi { device_id: String },

    /// Zero a device's counters
    ClearStats { device_id: String },

    /// Aggregate counters across all devices (direct reply)
    GetStats,

    /// Fresh registry snapshot (direct reply)
    GetDevices,
}

/// Scan lifecycle marker carried by [`ServerEvent::ScanStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Started,
    Complete,
}

/// Outbound server event, broadcast to observers or sent as a direct reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full snapshot, sent once when an observer connects
    DeviceList(Vec<Device>),

    DeviceAdded(Device),

    DeviceUpdate(Device),

    DeviceRemoved { id: String },

    /// One parsed log line
    Log(LogRecord),

    ScanStatus { status: ScanState, subnet: String },

    ScanResult { devices: Vec<String> },

    UsbDevices(Vec<UsbDevice>),

    WifiEnabled {
        device_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Aggregate counters across all devices
    Stats(LogStats),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ConnectionType, Device};
    use crate::record::LogLevel;

    #[test]
    fn test_command_action_tag() {
        let cmd: Command = serde_json::from_str(r#"{"action": "scan"}"#).unwrap();
        assert_eq!(cmd, Command::Scan);

        let cmd: Command =
            serde_json::from_str(r#"{"action": "add_device", "device_id": "10.0.0.5"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::AddDevice {
                device_id: "10.0.0.5".to_string(),
                connection_type: None
            }
        );

        let cmd: Command = serde_json::from_str(
            r#"{"action": "set_nickname", "device_id": "10.0.0.5:5555", "nickname": "Left rig"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::SetNickname {
                device_id: "10.0.0.5:5555".to_string(),
                nickname: "Left rig".to_string()
            }
        );
    }

    #[test]
    fn test_add_device_carries_connection_type() {
        let cmd: Command = serde_json::from_str(
            r#"{"action": "add_device", "device_id": "2B0YC1GF7G", "connection_type": "direct"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::AddDevice {
                device_id: "2B0YC1GF7G".to_string(),
                connection_type: Some(ConnectionType::Direct)
            }
        );

        // Absent on the wire when unset
        let value = serde_json::to_value(Command::AddDevice {
            device_id: "10.0.0.5".to_string(),
            connection_type: None,
        })
        .unwrap();
        assert!(value.get("connection_type").is_none());
    }

    #[test]
    fn test_unknown_action_fails_deserialization() {
        let result: Result<Command, _> = serde_json::from_str(r#"{"action": "self_destruct"}"#);
        assert!(result.is_err());

        let result: Result<Command, _> = serde_json::from_str(r#"{"no_action": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_event_envelope_shape() {
        let event = ServerEvent::DeviceRemoved {
            id: "10.0.0.5:5555".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "device_removed");
        assert_eq!(value["data"]["id"], "10.0.0.5:5555");
    }

    #[test]
    fn test_log_event_envelope() {
        let record = LogRecord {
            timestamp: "01-15 10:23:45.123".to_string(),
            level: LogLevel::I,
            tag: "Quantum".to_string(),
            message: "Match started".to_string(),
            category: Some("quantum".to_string()),
            raw: "raw".to_string(),
            device_id: Some("10.0.0.5:5555".to_string()),
            device_name: None,
            device_color: None,
        };

        let value = serde_json::to_value(ServerEvent::Log(record)).unwrap();
        assert_eq!(value["type"], "log");
        assert_eq!(value["data"]["tag"], "Quantum");
        assert_eq!(value["data"]["level"], "I");
    }

    #[test]
    fn test_device_list_serializes_as_array() {
        let device = Device::new("10.0.0.5:5555", ConnectionType::Network, "#3fb950");
        let value = serde_json::to_value(ServerEvent::DeviceList(vec![device])).unwrap();

        assert_eq!(value["type"], "device_list");
        assert!(value["data"].is_array());
        assert_eq!(value["data"][0]["id"], "10.0.0.5:5555");
    }

    #[test]
    fn test_scan_events() {
        let value = serde_json::to_value(ServerEvent::ScanStatus {
            status: ScanState::Started,
            subnet: "10.0.0.0/24".to_string(),
        })
        .unwrap();
        assert_eq!(value["type"], "scan_status");
        assert_eq!(value["data"]["status"], "started");

        let value = serde_json::to_value(ServerEvent::ScanResult {
            devices: vec!["10.0.0.5:5555".to_string()],
        })
        .unwrap();
        assert_eq!(value["type"], "scan_result");
        assert_eq!(value["data"]["devices"][0], "10.0.0.5:5555");
    }

    #[test]
    fn test_wifi_enabled_omits_absent_fields() {
        let value = serde_json::to_value(ServerEvent::WifiEnabled {
            device_id: "ABC123".to_string(),
            success: true,
            ip: Some("10.0.0.9".to_string()),
            error: None,
        })
        .unwrap();

        assert_eq!(value["type"], "wifi_enabled");
        assert_eq!(value["data"]["success"], true);
        assert_eq!(value["data"]["ip"], "10.0.0.9");
        assert!(value["data"].get("error").is_none());
    }
}
