//! # logdeck-core - Core Domain Types
//!
//! Foundation crate for logdeck. Provides domain types, error handling,
//! the logcat line parser, and the observer wire vocabulary.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`record`, `device`)
//! - [`LogRecord`] - One parsed, structured log line
//! - [`LogLevel`] - Log severity (`V < D < I < W < E < F`)
//! - [`LogStats`] - Per-severity running counters
//! - [`Device`], [`DeviceStatus`], [`ConnectionType`] - Registry entries
//! - [`UsbDevice`] - Directly-attached device enumeration result
//!
//! ### Parsing (`parser`)
//! - [`LogParser`] - `threadtime` logcat line -> `LogRecord`
//! - [`CategoryRule`] - Data-driven classification rules
//!
//! ### Wire Vocabulary (`wire`)
//! - [`Command`] - Inbound observer commands (`action`-tagged)
//! - [`ServerEvent`] - Outbound events (`type`/`data` envelope)
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use logdeck_core::prelude::*;
//! ```

pub mod device;
pub mod error;
pub mod logging;
pub mod parser;
pub mod record;
pub mod wire;

/// Prelude for common imports used throughout all logdeck crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use device::{
    normalize_device_id, ConnectionType, Device, DeviceStatus, UsbDevice, DEFAULT_DEVICE_PORT,
    DEVICE_COLORS,
};
pub use error::{Error, Result, ResultExt};
pub use parser::{CategoryRule, LogParser, DEFAULT_CATEGORY_RULES};
pub use record::{LogLevel, LogRecord, LogStats};
pub use wire::{Command, ScanState, ServerEvent};
