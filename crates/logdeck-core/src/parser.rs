//! Logcat line parser
//!
//! Turns one raw `threadtime`-format logcat line into a [`LogRecord`], or
//! `None` for anything that does not match the structural pattern. Parsing
//! is pure and stateless; lines that fail the pattern are dropped silently.
//!
//! Two heuristics refine the record beyond the structural fields:
//!
//! - **Bracket tag promotion**: a leading `[label]` token in the message
//!   body replaces the raw logcat tag, unless the label looks like a
//!   duration (`12h 34m` style uptime prefixes some engines emit). The
//!   promoted token is removed from the message body.
//! - **Category classification**: an ordered, first-match-wins keyword rule
//!   table. The table is data-driven so deployments can extend it.

use regex::Regex;

use crate::record::{LogLevel, LogRecord};

/// One ordered classification rule: the first rule with any keyword
/// contained in the lowercased message body wins.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: &'static str,
    pub keywords: &'static [&'static str],
}

/// Default rule table, highest priority first.
pub const DEFAULT_CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: "quantum",
        keywords: &["quantum"],
    },
    CategoryRule {
        category: "vivox",
        keywords: &["vivox"],
    },
    CategoryRule {
        category: "network",
        keywords: &["connection", "network", "http"],
    },
    CategoryRule {
        category: "analytics",
        keywords: &["analytics", "firebase"],
    },
    CategoryRule {
        category: "camera",
        keywords: &["camera", "follower"],
    },
    CategoryRule {
        category: "player",
        keywords: &["player", "roy"],
    },
];

/// Parser for `threadtime`-format logcat lines.
///
/// Compiles its patterns once; cheap to share behind a reference.
#[derive(Debug)]
pub struct LogParser {
    line_pattern: Regex,
    bracket_pattern: Regex,
    duration_pattern: Regex,
    color_pattern: Regex,
    rules: Vec<CategoryRule>,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    /// Create a parser with the default category rule table
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_CATEGORY_RULES.to_vec())
    }

    /// Create a parser with a custom category rule table
    pub fn with_rules(rules: Vec<CategoryRule>) -> Self {
        Self {
            // timestamp, pid, tid, level letter, tag, colon, message
            line_pattern: Regex::new(
                r"^(\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3})\s+(\d+)\s+(\d+)\s+([VDIWEF])\s+(\S+)\s*:\s*(.*)$",
            )
            .expect("log line pattern is valid"),
            bracket_pattern: Regex::new(r"\[([^\]]+)\]").expect("bracket pattern is valid"),
            duration_pattern: Regex::new(r"^\d+hs?\s+\d+m").expect("duration pattern is valid"),
            color_pattern: Regex::new(r"<color=([^>]+)>([^<]*)</color>")
                .expect("color pattern is valid"),
            rules,
        }
    }

    /// Parse one raw line. Returns `None` for empty, whitespace-only, or
    /// structurally malformed lines.
    pub fn parse(&self, raw_line: &str) -> Option<LogRecord> {
        let line = raw_line.trim();
        if line.is_empty() {
            return None;
        }

        let caps = self.line_pattern.captures(line)?;

        let timestamp = caps.get(1)?.as_str().to_string();
        let level = LogLevel::from_char(caps.get(4)?.as_str().chars().next()?)?;
        let raw_tag = caps.get(5)?.as_str();
        let body = caps.get(6)?.as_str();

        // Category is derived from the full body, before any token removal,
        // so a promoted bracket label still counts toward classification.
        let category = self.classify(body);

        let (tag, body) = self.promote_bracket_tag(raw_tag, body);

        let message = self
            .color_pattern
            .replace_all(&body, "$2")
            .trim()
            .to_string();

        Some(LogRecord {
            timestamp,
            level,
            tag,
            message,
            category,
            raw: line.to_string(),
            device_id: None,
            device_name: None,
            device_color: None,
        })
    }

    /// First-match-wins keyword classification over the lowercased body
    fn classify(&self, body: &str) -> Option<String> {
        let lower = body.to_lowercase();
        for rule in &self.rules {
            if rule.keywords.iter().any(|kw| lower.contains(kw)) {
                return Some(rule.category.to_string());
            }
        }
        None
    }

    /// If the body carries a bracketed label that is not duration-like,
    /// promote it to the tag and remove the token from the body.
    fn promote_bracket_tag(&self, raw_tag: &str, body: &str) -> (String, String) {
        if let Some(caps) = self.bracket_pattern.captures(body) {
            let label = &caps[1];
            if !self.duration_pattern.is_match(label) {
                let token = caps.get(0).expect("whole match exists");
                let mut stripped = String::with_capacity(body.len());
                stripped.push_str(&body[..token.start()]);
                stripped.push_str(body[token.end()..].trim_start());
                return (label.to_string(), stripped);
            }
        }
        (raw_tag.to_string(), body.to_string())
    }
}
