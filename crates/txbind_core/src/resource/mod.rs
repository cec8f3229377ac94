//! Resource factories and the connections they produce.

mod backend;

pub use backend::{BackendConnection, BackendFactory};

use crate::definition::TransactionDefinition;
use crate::error::TxResult;
use crate::types::ResourceKey;

/// A live handle over which a native transaction runs.
///
/// Handles are cheap to clone; clones share the same underlying session, so
/// the copy bound to the thread and the copy handed to user code observe the
/// same transaction.
pub trait TransactionalConnection: Clone + 'static {
    /// Starts a native transaction on this connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already in progress or the
    /// resource refuses to start one.
    fn begin(&self, definition: &TransactionDefinition) -> TxResult<()>;

    /// Commits the native transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is in progress or the resource
    /// fails to make the writes durable.
    fn commit(&self) -> TxResult<()>;

    /// Rolls back the native transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is in progress.
    fn rollback(&self) -> TxResult<()>;

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource fails to release it.
    fn close(&self) -> TxResult<()> {
        Ok(())
    }
}

/// The single native resource a transaction manager is bound to.
///
/// A factory identifies itself with a [`ResourceKey`] that never changes
/// and is never shared with another factory.
pub trait ResourceFactory: Send + Sync {
    /// The connection type this factory produces.
    type Connection: TransactionalConnection;

    /// The factory's identity.
    fn resource_key(&self) -> ResourceKey;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be reached.
    fn connect(&self) -> TxResult<Self::Connection>;
}
