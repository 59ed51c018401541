//! Log record domain types
//!
//! A [`LogRecord`] is one parsed logcat line, stamped with the metadata of
//! the device that produced it. Records are ephemeral: they are created per
//! parsed line, broadcast to observers, and dropped.

use serde::{Deserialize, Serialize};

/// Log severity, ordered lowest to highest.
///
/// Matches the single-letter logcat priority characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    V,
    D,
    I,
    W,
    E,
    F,
}

impl LogLevel {
    /// Parse a logcat priority character
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'V' => Some(LogLevel::V),
            'D' => Some(LogLevel::D),
            'I' => Some(LogLevel::I),
            'W' => Some(LogLevel::W),
            'E' => Some(LogLevel::E),
            'F' => Some(LogLevel::F),
            _ => None,
        }
    }

    /// The logcat priority character for this level
    pub fn as_char(&self) -> char {
        match self {
            LogLevel::V => 'V',
            LogLevel::D => 'D',
            LogLevel::I => 'I',
            LogLevel::W => 'W',
            LogLevel::E => 'E',
            LogLevel::F => 'F',
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One parsed, structured log line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Device-local time, fixed format `MM-DD HH:MM:SS.mmm`
    pub timestamp: String,

    /// Severity letter
    pub level: LogLevel,

    /// Short source identifier. If the message body carried a bracketed
    /// `[label]` token, the label replaces the raw logcat tag.
    pub tag: String,

    /// Message body with colorization markup stripped
    pub message: String,

    /// Optional classification from the keyword rule table
    #[serde(default)]
    pub category: Option<String>,

    /// The unmodified input line, kept for client-side export
    pub raw: String,

    /// Stamped by the owning device session before broadcast
    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub device_name: Option<String>,

    #[serde(default)]
    pub device_color: Option<String>,
}

/// Per-severity running counters plus a total.
///
/// Reset only on explicit command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    #[serde(rename = "V")]
    pub verbose: u64,
    #[serde(rename = "D")]
    pub debug: u64,
    #[serde(rename = "I")]
    pub info: u64,
    #[serde(rename = "W")]
    pub warning: u64,
    #[serde(rename = "E")]
    pub error: u64,
    #[serde(rename = "F")]
    pub fatal: u64,
    pub total: u64,
}

impl LogStats {
    /// Count one record of the given level
    pub fn record(&mut self, level: LogLevel) {
        match level {
            LogLevel::V => self.verbose += 1,
            LogLevel::D => self.debug += 1,
            LogLevel::I => self.info += 1,
            LogLevel::W => self.warning += 1,
            LogLevel::E => self.error += 1,
            LogLevel::F => self.fatal += 1,
        }
        self.total += 1;
    }

    /// Zero all counters
    pub fn reset(&mut self) {
        *self = LogStats::default();
    }
}
