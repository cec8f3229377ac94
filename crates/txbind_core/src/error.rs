//! Error types for transaction management.

use crate::types::ResourceKey;
use std::time::Duration;
use thiserror::Error;

/// Result type for transaction operations.
pub type TxResult<T> = Result<T, TransactionError>;

/// Errors raised by transaction managers, connections, and the binding registry.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] txbind_storage::StorageError),

    /// An operation required an active transaction and there was none.
    #[error("no transaction in progress: {message}")]
    NoTransaction {
        /// What needed the transaction.
        message: String,
    },

    /// The operation is not allowed in the current transaction state.
    #[error("illegal transaction state: {message}")]
    IllegalTransactionState {
        /// Why the state is illegal.
        message: String,
    },

    /// A value is already bound for the key on this thread.
    #[error("a resource is already bound for key {key} on this thread")]
    ResourceAlreadyBound {
        /// The occupied key.
        key: ResourceKey,
    },

    /// No value is bound for the key on this thread.
    #[error("no resource bound for key {key} on this thread")]
    NoResourceBound {
        /// The missing key.
        key: ResourceKey,
    },

    /// Commit was requested but the transaction had been marked rollback-only
    /// by a participant, so it was rolled back instead.
    #[error("transaction rolled back because it has been marked as rollback-only")]
    UnexpectedRollback,

    /// The transaction outlived its timeout and was rolled back.
    #[error("transaction timed out: deadline exceeded by {exceeded_by:?}")]
    TimedOut {
        /// How far past the deadline commit was attempted.
        exceeded_by: Duration,
    },

    /// A write was attempted inside a read-only transaction.
    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    /// The connection was already closed.
    #[error("connection to {key} is closed")]
    ConnectionClosed {
        /// Key of the factory that produced the connection.
        key: ResourceKey,
    },

    /// A synchronization callback vetoed the commit.
    #[error("synchronization failed: {message}")]
    Synchronization {
        /// Callback-provided reason.
        message: String,
    },

    /// Opening a connection or beginning the native transaction failed.
    #[error("could not open transaction on {key}: {source}")]
    CannotCreateTransaction {
        /// Key of the factory that failed.
        key: ResourceKey,
        /// Underlying failure.
        #[source]
        source: Box<TransactionError>,
    },
}

impl TransactionError {
    /// Creates a no-transaction error.
    pub fn no_transaction(message: impl Into<String>) -> Self {
        Self::NoTransaction {
            message: message.into(),
        }
    }

    /// Creates an illegal-state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalTransactionState {
            message: message.into(),
        }
    }

    /// Creates a synchronization error.
    pub fn synchronization(message: impl Into<String>) -> Self {
        Self::Synchronization {
            message: message.into(),
        }
    }

    /// Wraps a failure to open a transaction on `key`.
    pub fn cannot_create(key: ResourceKey, source: TransactionError) -> Self {
        Self::CannotCreateTransaction {
            key,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn storage_errors_convert() {
        let err: TransactionError = txbind_storage::StorageError::ReadPastEnd {
            offset: 4,
            len: 2,
            size: 5,
        }
        .into();
        assert!(matches!(err, TransactionError::Storage(_)));
    }

    #[test]
    fn cannot_create_keeps_source() {
        let key = ResourceKey::generate();
        let err = TransactionError::cannot_create(key, TransactionError::ReadOnly);
        assert!(err.to_string().contains(&key.to_string()));
        assert!(err.source().is_some());
    }
}
