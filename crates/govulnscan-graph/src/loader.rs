//! `go list` loader
//!
//! The Go toolchain is the producer of the typed package graph: one blocking
//! `go list -deps -json` invocation per scan, parsed from its stream of
//! concatenated JSON objects. Toolchain failures are classified into typed
//! errors where the message is recognizable; the raw output is always
//! chained.

use std::path::{Path, PathBuf};
use std::process::Command;

use govulnscan_core::CancelToken;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{LoadError, Result};

/// One package as reported by `go list -json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GoListPackage {
    pub import_path: String,
    pub name: String,
    pub dir: PathBuf,
    pub go_files: Vec<String>,
    pub imports: Vec<String>,
    pub module: Option<GoListModule>,
    pub standard: bool,
    /// Set when the package appears only as a dependency of the patterns.
    pub dep_only: bool,
    pub for_test: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GoListModule {
    pub path: String,
    pub version: Option<String>,
    pub replace: Option<Box<GoListModule>>,
    pub main: bool,
}

/// Options for the loader invocation.
#[derive(Debug, Clone, Default)]
pub struct LoadConfig {
    /// Working directory for the toolchain; `None` means the process cwd.
    pub dir: Option<PathBuf>,
    /// Build tags passed through as `-tags`.
    pub tags: Vec<String>,
    /// Include test-only packages (`-test`).
    pub include_tests: bool,
}

/// Load the transitive package closure of the given patterns.
pub fn load_packages(
    patterns: &[String],
    config: &LoadConfig,
    cancel: &CancelToken,
) -> Result<Vec<GoListPackage>> {
    if cancel.is_cancelled() {
        return Err(LoadError::Cancelled);
    }

    let mut cmd = Command::new("go");
    cmd.arg("list").arg("-e").arg("-deps").arg("-json");
    if !config.tags.is_empty() {
        cmd.arg(format!("-tags={}", config.tags.join(",")));
    }
    if config.include_tests {
        cmd.arg("-test");
    }
    cmd.args(patterns);
    if let Some(dir) = &config.dir {
        cmd.current_dir(dir);
    }

    info!(?patterns, "loading packages");
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(classify_go_error(&String::from_utf8_lossy(&output.stderr)));
    }

    let packages = parse_go_list(&output.stdout)?;
    debug!(count = packages.len(), "loaded packages");
    Ok(packages)
}

/// Parse a `go list -json` stream of concatenated JSON objects.
pub fn parse_go_list(stream: &[u8]) -> Result<Vec<GoListPackage>> {
    let mut packages = Vec::new();
    for pkg in serde_json::Deserializer::from_slice(stream).into_iter::<GoListPackage>() {
        packages.push(pkg?);
    }
    Ok(packages)
}

/// The running toolchain's version string, e.g. `go1.21.3`. The `GOVERSION`
/// environment variable overrides the toolchain query.
pub fn toolchain_version(dir: Option<&Path>, cancel: &CancelToken) -> Result<String> {
    if let Ok(v) = std::env::var("GOVERSION") {
        if !v.is_empty() {
            return Ok(v);
        }
    }
    if cancel.is_cancelled() {
        return Err(LoadError::Cancelled);
    }

    let mut cmd = Command::new("go");
    cmd.arg("env").arg("GOVERSION");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(classify_go_error(&String::from_utf8_lossy(&output.stderr)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn classify_go_error(stderr: &str) -> LoadError {
    let message = stderr.trim().to_string();
    if message.contains("go.mod file not found") || message.contains("not in a module") {
        LoadError::NoModule(message)
    } else if message.contains("requires go >=") || message.contains("newer Go version") {
        LoadError::ToolchainMismatch(message)
    } else {
        LoadError::GoList(message)
    }
}
