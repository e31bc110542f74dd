//! Error types for binary inspection

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BinaryError>;

#[derive(Error, Debug)]
pub enum BinaryError {
    /// Not an ELF, Mach-O, or PE image.
    #[error("unrecognized executable format")]
    UnrecognizedFormat,

    /// The image carries no Go build information; it was not produced by
    /// the Go toolchain (or predates embedded build info).
    #[error("no Go build info found in binary")]
    NoBuildInfo,

    #[error("malformed build info: {0}")]
    Parse(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan cancelled")]
    Cancelled,
}
