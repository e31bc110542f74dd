//! OSV schema types for the Go vulnerability database
//!
//! Models the subset of the OSV schema (<https://ossf.github.io/osv-schema/>)
//! served by Go-flavored vulnerability databases: each `affected` block names
//! a Go module, its affected version ranges, and the packages and symbols
//! within the module that actually contain the vulnerable code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod version;

pub use version::{affects, canonical_version, latest_fixed, semver_affects};

/// A single vulnerability record, the atomic unit served by the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,

    /// Unique identifier, e.g. `GO-2021-0113`.
    pub id: String,

    /// Last modification time, RFC3339 in UTC.
    pub modified: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawn: Option<DateTime<Utc>>,

    /// IDs of the same vulnerability in other databases (CVE, GHSA).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected: Vec<Affected>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_specific: Option<serde_json::Value>,
}

impl Entry {
    /// All `Affected` blocks naming the given module path.
    pub fn affected_for_module<'a>(&'a self, module_path: &'a str) -> impl Iterator<Item = &'a Affected> + 'a {
        self.affected
            .iter()
            .filter(move |a| a.module.path == module_path)
    }
}

/// The module (OSV calls it `package`) affected by a vulnerability, together
/// with the version ranges and per-package symbol detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Affected {
    #[serde(rename = "package")]
    pub module: ModuleRef,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<Range>,

    #[serde(default, skip_serializing_if = "EcosystemSpecific::is_empty")]
    pub ecosystem_specific: EcosystemSpecific,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleRef {
    pub path: String,

    #[serde(default = "go_ecosystem")]
    pub ecosystem: String,
}

fn go_ecosystem() -> String {
    "Go".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Version range over which a module is affected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Range {
    #[serde(rename = "type")]
    pub kind: RangeKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<RangeEvent>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RangeKind {
    Semver,
    Ecosystem,
    Git,
}

/// One `introduced`/`fixed` transition. Exactly one field is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RangeEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduced: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed: Option<String>,
}

impl RangeEvent {
    pub fn introduced(v: &str) -> Self {
        RangeEvent {
            introduced: Some(v.to_string()),
            fixed: None,
        }
    }

    pub fn fixed(v: &str) -> Self {
        RangeEvent {
            introduced: None,
            fixed: Some(v.to_string()),
        }
    }
}

/// Go-specific detail: the packages within the affected module that contain
/// the vulnerability, with optional symbol lists and platform filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EcosystemSpecific {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
}

impl EcosystemSpecific {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Package {
    /// Package import path, e.g. `golang.org/x/text/language`.
    pub path: String,

    /// Operating systems the vulnerability applies to; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goos: Vec<String>,

    /// Architectures the vulnerability applies to; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goarch: Vec<String>,

    /// Vulnerable symbols; empty means every symbol of the package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
}

impl Package {
    /// Whether the package's platform filters admit the given GOOS/GOARCH.
    pub fn matches_platform(&self, goos: &str, goarch: &str) -> bool {
        let os_ok = self.goos.is_empty() || self.goos.iter().any(|s| s == goos);
        let arch_ok = self.goarch.is_empty() || self.goarch.iter().any(|s| s == goarch);
        os_ok && arch_ok
    }
}
