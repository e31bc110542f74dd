//! Emission protocol messages
//!
//! A scan produces a linear stream of messages: exactly one `Config` first,
//! advisory `Progress` lines, and for every vulnerability one `OSV` record
//! followed by its findings. The JSON encoding is line-delimited, one
//! externally-tagged message per line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ScanLevel;

/// One message of the emission stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Message {
    Config(Config),
    Progress(Progress),
    Osv(govulnscan_osv::Entry),
    Finding(Finding),
}

/// Scan metadata; always the first message of a stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub protocol_version: String,
    pub scanner_name: String,
    pub scanner_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_last_modified: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_version: Option<String>,

    pub scan_level: ScanLevel,
}

/// Advisory progress line. Carries no semantic detail; outputs never depend
/// on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub time: DateTime<Utc>,
    pub message: String,
}

impl Progress {
    pub fn now(message: impl Into<String>) -> Self {
        Progress {
            time: Utc::now(),
            message: message.into(),
        }
    }
}

/// A single detection: one OSV applied to the target, with evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    /// The OSV id this finding belongs to.
    pub osv: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,

    /// Evidence trace, sink first. A single module frame for module-level
    /// findings, a package frame for package-level, a full call stack for
    /// symbol-level.
    pub trace: Vec<Frame>,
}

impl Finding {
    /// The precision this finding's evidence establishes.
    pub fn level(&self) -> ScanLevel {
        match self.trace.first() {
            Some(frame) if frame.function.is_some() => ScanLevel::Symbol,
            Some(frame) if frame.package.is_some() => ScanLevel::Package,
            _ => ScanLevel::Module,
        }
    }

    /// Sort key for the stable per-run finding order.
    pub fn sort_key(&self) -> (String, String, String, String, String) {
        let frame = self.trace.first();
        let field = |f: fn(&Frame) -> Option<&String>| {
            frame.and_then(f).cloned().unwrap_or_default()
        };
        (
            self.osv.clone(),
            frame.map(|f| f.module.clone()).unwrap_or_default(),
            field(|f| f.package.as_ref()),
            field(|f| f.receiver.as_ref()),
            field(|f| f.function.as_ref()),
        )
    }
}

/// One frame of evidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub module: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// A source position. `offset` is a byte offset; `line` and `column` are
/// 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub filename: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}
