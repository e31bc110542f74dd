//! Scan orchestration
//!
//! Ties the database client, package graph, call-graph analysis, and binary
//! inspection together into the two scan drivers, and owns the emission
//! protocol: one `Config` first, one `OSV` message per referenced
//! vulnerability before its findings, and a single precision level per OSV.

use govulnscan_core::{Config, ScanLevel, PROTOCOL_VERSION, SCANNER_NAME, VERSION};
use govulnscan_db::Client;

mod affecting;
mod binary;
mod emit;
mod error;
mod findings;
mod source;

pub use affecting::{affecting_vulns, applicable_packages, ModuleVulns};
pub use binary::scan_binary;
pub use emit::Handler;
pub use error::{Result, ScanError};
pub use source::scan_source;

/// The `Config` message for a scan over the given database.
pub fn config_message(client: &Client, go_version: Option<&str>, level: ScanLevel) -> Config {
    Config {
        protocol_version: PROTOCOL_VERSION.to_string(),
        scanner_name: SCANNER_NAME.to_string(),
        scanner_version: VERSION.to_string(),
        db: Some(client.describe()),
        db_last_modified: Some(client.last_modified()),
        go_version: go_version.map(str::to_string),
        scan_level: level,
    }
}
