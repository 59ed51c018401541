//! # logdeck-server - Registry, Sessions, and Observer Protocol
//!
//! The server half of logdeck: tracks devices, runs one session per
//! device, fans parsed log records out to observers, and serves the
//! WebSocket command/event protocol.
//!
//! Layering: [`Server`] accepts observers and parses frames into commands,
//! [`Dispatcher`] routes commands, [`Registry`] owns [`DeviceSession`]s,
//! and everything that happens is announced through the [`Broadcaster`].
//!
//! ## Public API
//!
//! - [`Server`] - WebSocket listener and per-observer loops
//! - [`Dispatcher`] / [`ScanConfig`] - Command routing
//! - [`Registry`] - Device CRUD and persistence
//! - [`DeviceSession`] / [`SessionTiming`] - Per-device state machine
//! - [`Broadcaster`] - Event fan-out

pub mod broadcast;
pub mod dispatch;
pub mod registry;
pub mod server;
pub mod session;

// Public API re-exports
pub use broadcast::{Broadcaster, ObserverId};
pub use dispatch::{Dispatcher, ScanConfig};
pub use registry::{default_state_file, PersistedDevice, Registry};
pub use server::Server;
pub use session::{DeviceSession, SessionTiming, RECONNECT_BACKOFF};
