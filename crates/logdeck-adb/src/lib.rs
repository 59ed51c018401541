//! # logdeck-adb - Device Control Backend
//!
//! adb process management for logdeck: connecting and disconnecting
//! devices, enumerating USB serials, promoting devices to network mode,
//! streaming logcat output, and probing the local subnet for devices.
//!
//! Depends on [`logdeck_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Backend Seam
//! - [`DeviceBackend`] - Capability trait the session layer works against
//! - [`AdbBackend`] - Production implementation shelling out to `adb`
//! - [`LogStream`] - Long-lived stream of decoded log lines with teardown
//!
//! ### Discovery
//! - [`scan`] - Probe the local /24 subnet for devices
//! - [`ScanOutcome`] - Subnet label plus reachable addresses
//!
//! ### Test Helpers (feature `test-helpers`)
//! - [`FakeBackend`] - Scriptable backend that counts connects and streams

pub mod adb;
pub mod backend;
pub mod discovery;
pub mod logcat;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use adb::AdbBackend;
pub use backend::{DeviceBackend, LocalDeviceBackend, LogStream};
pub use discovery::{local_ipv4, scan, subnet_candidates, ScanOutcome, DEFAULT_PROBE_TIMEOUT};
#[cfg(any(test, feature = "test-helpers"))]
pub use test_utils::{FakeBackend, ScriptedStream};
