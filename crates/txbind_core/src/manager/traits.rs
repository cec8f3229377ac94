//! Transaction manager contracts.

use crate::definition::TransactionDefinition;
use crate::error::TxResult;
use crate::status::TransactionStatus;
use tracing::warn;

/// Begin, commit, and roll back units of work over connections of type `T`.
pub trait SynchronousTransactionManager<T> {
    /// Returns a status for a new or existing transaction, according to the
    /// definition's propagation behavior.
    ///
    /// # Errors
    ///
    /// Returns an error if the propagation rules forbid the request or the
    /// native transaction cannot be started.
    fn get_transaction(&self, definition: &TransactionDefinition) -> TxResult<TransactionStatus<T>>;

    /// Commits the scope represented by `status`.
    ///
    /// A status marked rollback-only is rolled back instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is already completed, the transaction
    /// was rolled back unexpectedly or timed out, or the commit failed.
    fn commit(&self, status: &mut TransactionStatus<T>) -> TxResult<()>;

    /// Rolls back the scope represented by `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is already completed or the rollback failed.
    fn rollback(&self, status: &mut TransactionStatus<T>) -> TxResult<()>;

    /// The connection bound to the current thread's transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NoTransaction`](crate::TransactionError::NoTransaction)
    /// if this manager has no transaction on the current thread.
    fn connection(&self) -> TxResult<T>;

    /// Runs `work` inside a transaction described by `definition`.
    ///
    /// Commits if `work` succeeds, rolls back if it fails. If the rollback
    /// itself fails, the failure is logged and the error from `work` is
    /// returned. `work` may complete the status itself, in which case
    /// nothing more happens. If `work` panics, the scope is rolled back
    /// while unwinding.
    ///
    /// # Errors
    ///
    /// Returns the error from `get_transaction`, `work`, or `commit`.
    fn execute<R, F>(&self, definition: &TransactionDefinition, work: F) -> TxResult<R>
    where
        Self: Sized,
        F: FnOnce(&mut TransactionStatus<T>) -> TxResult<R>,
    {
        let mut scope = ScopeGuard {
            manager: self,
            status: self.get_transaction(definition)?,
        };
        let status = &mut scope.status;
        match work(status) {
            Ok(value) => {
                if !status.is_completed() {
                    self.commit(status)?;
                }
                Ok(value)
            }
            Err(err) => {
                if !status.is_completed() {
                    if let Err(rollback_err) = self.rollback(status) {
                        warn!(
                            error = %rollback_err,
                            "rollback after failed transactional work also failed"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// [`execute`](Self::execute) with a read-only `Required` definition.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    fn execute_read<R, F>(&self, work: F) -> TxResult<R>
    where
        Self: Sized,
        F: FnOnce(&mut TransactionStatus<T>) -> TxResult<R>,
    {
        self.execute(&TransactionDefinition::read_only_default(), work)
    }

    /// [`execute`](Self::execute) with the default read-write definition.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    fn execute_write<R, F>(&self, work: F) -> TxResult<R>
    where
        Self: Sized,
        F: FnOnce(&mut TransactionStatus<T>) -> TxResult<R>,
    {
        self.execute(&TransactionDefinition::DEFAULT, work)
    }
}

/// Rolls back a scope whose work panicked before completing it.
struct ScopeGuard<'a, M, T>
where
    M: SynchronousTransactionManager<T>,
{
    manager: &'a M,
    status: TransactionStatus<T>,
}

impl<M, T> Drop for ScopeGuard<'_, M, T>
where
    M: SynchronousTransactionManager<T>,
{
    fn drop(&mut self) {
        if std::thread::panicking() && !self.status.is_completed() {
            if let Err(err) = self.manager.rollback(&mut self.status) {
                warn!(error = %err, "rollback of a panicking transaction scope failed");
            }
        }
    }
}

/// A transaction manager that operates on a single native resource.
///
/// Unlike a coordinator enlisting any number of resources, an implementor
/// is bound to exactly one resource factory when it is constructed and
/// stays bound to it for its whole lifetime. The factory is what the
/// manager uses as its key into
/// [`TransactionSynchronizationManager`](crate::TransactionSynchronizationManager),
/// so callers holding only the trait can find the connection a transaction
/// is running on.
///
/// `R` is the resource factory type, `T` the connection type.
pub trait ResourceTransactionManager<R, T>: SynchronousTransactionManager<T> {
    /// The resource factory this manager operates on.
    ///
    /// Never fails and always returns the same factory.
    fn resource_factory(&self) -> &R;
}
