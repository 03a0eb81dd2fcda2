//! Stock ledger error taxonomy.

use thiserror::Error;

use stockledger_core::DomainError;

/// Result type used by every stock ledger operation.
pub type StockResult<T> = Result<T, StockError>;

/// Coarse error classification exposed to the presentation layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StockErrorKind {
    InsufficientAvailableStock,
    InsufficientReservedStock,
    FloorViolation,
    InvalidMovementType,
    InvalidInput,
    StorageConflict,
}

/// Stock ledger error.
///
/// Business-rule variants are detected before any mutation is applied and carry
/// the actionable limit (available amount, maximum outbound, ...). None of them
/// is fatal; `StorageConflict` is the only kind worth retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("insufficient available stock (available: {available}, requested: {requested})")]
    InsufficientAvailableStock { available: i64, requested: i64 },

    #[error("insufficient reserved stock (reserved: {reserved}, requested: {requested})")]
    InsufficientReservedStock { reserved: i64, requested: i64 },

    #[error(
        "cannot reduce stock below reserved quantity (max outbound: {max_outbound}, requested: {requested})"
    )]
    BelowReservedOnExit { max_outbound: i64, requested: i64 },

    #[error(
        "new stock cannot be less than reserved quantity (reserved: {reserved}, requested: {requested})"
    )]
    BelowReservedOnAdjustment { reserved: i64, requested: i64 },

    #[error("invalid movement type: {0}")]
    InvalidMovementType(String),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("storage conflict: {0}")]
    StorageConflict(String),
}

impl StockError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageConflict(msg.into())
    }

    pub fn kind(&self) -> StockErrorKind {
        match self {
            StockError::InsufficientAvailableStock { .. } => {
                StockErrorKind::InsufficientAvailableStock
            }
            StockError::InsufficientReservedStock { .. } => {
                StockErrorKind::InsufficientReservedStock
            }
            StockError::BelowReservedOnExit { .. }
            | StockError::BelowReservedOnAdjustment { .. } => StockErrorKind::FloorViolation,
            StockError::InvalidMovementType(_) => StockErrorKind::InvalidMovementType,
            StockError::Invalid(_) => StockErrorKind::InvalidInput,
            StockError::StorageConflict(_) => StockErrorKind::StorageConflict,
        }
    }

    /// Whether the whole logical operation may be retried from the top.
    ///
    /// Business rejections are not retryable: a retried reserve after a genuine
    /// shortage must not succeed on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StockError::StorageConflict(_))
    }
}
