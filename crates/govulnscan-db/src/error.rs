//! Error types for the vulnerability database client

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    /// The source does not serve the versioned layout (`index/db` missing).
    /// Legacy layouts are deliberately unsupported.
    #[error("unsupported schema")]
    UnsupportedSchema,

    #[error("database transport error: {0}")]
    Transport(String),

    #[error("database returned status {0}")]
    Status(u16),

    #[error("database decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan cancelled")]
    Cancelled,
}
