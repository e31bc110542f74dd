//! Error types for scan orchestration

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Db(#[from] govulnscan_db::DbError),

    #[error(transparent)]
    Load(#[from] govulnscan_graph::LoadError),

    #[error(transparent)]
    Binary(#[from] govulnscan_binary::BinaryError),

    #[error(transparent)]
    Reach(#[from] govulnscan_reachability::ReachError),

    /// A message handler failed (broken pipe, render error).
    #[error(transparent)]
    Emit(#[from] anyhow::Error),

    /// Sentinel for a finding-bearing run; the CLI maps it to its own exit
    /// code.
    #[error("vulnerabilities found")]
    VulnsFound,
}

impl ScanError {
    /// Whether this error is the cooperative-cancellation signal, at any
    /// layer.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ScanError::Db(govulnscan_db::DbError::Cancelled)
                | ScanError::Load(govulnscan_graph::LoadError::Cancelled)
                | ScanError::Binary(govulnscan_binary::BinaryError::Cancelled)
                | ScanError::Reach(govulnscan_reachability::ReachError::Cancelled)
        )
    }
}
