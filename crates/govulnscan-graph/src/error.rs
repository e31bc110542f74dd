//! Error types for package loading and graph construction

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    /// The Go toolchain failed to load packages. The raw toolchain output is
    /// chained; well-known sub-cases are classified below.
    #[error("loading packages failed: {0}")]
    GoList(String),

    /// The target directory is not inside a module.
    #[error("no go.mod found: {0}")]
    NoModule(String),

    /// The module requires a newer toolchain than the one running.
    #[error("toolchain version mismatch: {0}")]
    ToolchainMismatch(String),

    #[error("module replacement cycle through {0}")]
    ReplaceCycle(String),

    #[error("package {0} not reachable from any root")]
    Unreachable(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding go list output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("scan cancelled")]
    Cancelled,
}
