//! Core types shared across the govulnscan crates
//!
//! This crate provides the vocabulary every other crate speaks:
//! - Scan precision levels and the effective scan platform
//! - The emission protocol messages (`Config`, `Progress`, `Finding`)
//! - Cooperative cancellation for long-running scans

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod message;

pub use message::{Config, Finding, Frame, Message, Position, Progress};

/// govulnscan version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported in the `Config` message.
pub const SCANNER_NAME: &str = "govulnscan";

/// Version of the emission protocol. Bumped on any schema change.
pub const PROTOCOL_VERSION: &str = "v1.0.0";

/// Precision at which a finding is reported.
///
/// The levels form a lattice: `Module < Package < Symbol`. A module-level
/// finding means the vulnerable module is required; package-level means a
/// vulnerable package is imported; symbol-level means a vulnerable symbol is
/// reachable in the call graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ScanLevel {
    Module,
    Package,
    Symbol,
}

impl ScanLevel {
    /// Whether this level asks for import analysis.
    pub fn wants_packages(self) -> bool {
        self >= ScanLevel::Package
    }

    /// Whether this level asks for call-graph analysis.
    pub fn wants_symbols(self) -> bool {
        self >= ScanLevel::Symbol
    }
}

impl fmt::Display for ScanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanLevel::Module => write!(f, "module"),
            ScanLevel::Package => write!(f, "package"),
            ScanLevel::Symbol => write!(f, "symbol"),
        }
    }
}

/// The GOOS/GOARCH pair platform filters are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub goos: String,
    pub goarch: String,
}

impl Platform {
    pub fn new(goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        Platform {
            goos: goos.into(),
            goarch: goarch.into(),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        let goos = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let goarch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Platform::new(goos, goarch)
    }
}

/// Cooperative cancellation flag, checked at every suspension point
/// (database fetches, binary reads, the external package loader).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
