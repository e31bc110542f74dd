//! Error types for call-graph construction

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReachError>;

#[derive(Error, Debug)]
pub enum ReachError {
    #[error("parse error in {file}: {message}")]
    Parse { file: PathBuf, message: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan cancelled")]
    Cancelled,
}
