use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`DocumentStore`](crate::store::DocumentStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),
    /// The named table is already being created (or otherwise busy).
    #[error("table in use: {0}")]
    TableInUse(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage has not been started")]
    NotStarted,
    #[error("state type mismatch: expected {expected}, found {actual}")]
    StateTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error(
        "hit max retry attempts ({attempts}, {delay:?} apart) while waiting for table to become active: {table}"
    )]
    ProvisionTimeout {
        table: String,
        attempts: u32,
        delay: Duration,
    },
    #[error("failed to encode or decode state: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = PersistenceError> = std::result::Result<T, E>;

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::TableNotFound(_))
    }

    pub fn is_in_use(&self) -> bool {
        matches!(self, StoreError::TableInUse(_))
    }
}

impl PersistenceError {
    /// Whether the failure signals a programming error rather than a runtime condition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, PersistenceError::StateTypeMismatch { .. })
    }
}
