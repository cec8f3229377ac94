//! Transaction synchronization callbacks.

use crate::error::TxResult;
use crate::support::registry::TransactionSynchronizationManager;
use tracing::trace;

/// How a transaction ended, as reported to [`TransactionSynchronization::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The native transaction committed.
    Committed,
    /// The native transaction rolled back.
    RolledBack,
    /// The outcome could not be determined (e.g. commit and rollback both failed).
    Unknown,
}

/// Callbacks invoked around the completion of the current thread's transaction.
///
/// Register an instance with
/// [`TransactionSynchronizationManager::register_synchronization`] while a
/// transaction is active. Callbacks run only for the outermost (new)
/// transaction, never for participants.
///
/// Order on commit: `before_commit`, `before_completion`, native commit,
/// `after_commit`, `after_completion(Committed)`.
/// Order on rollback: `before_completion`, native rollback,
/// `after_completion(RolledBack)`.
pub trait TransactionSynchronization {
    /// Runs before commit. Returning an error vetoes the commit and the
    /// transaction is rolled back.
    ///
    /// # Errors
    ///
    /// Any error aborts the commit and is returned to the committer.
    fn before_commit(&self, read_only: bool) -> TxResult<()> {
        let _ = read_only;
        Ok(())
    }

    /// Runs before commit or rollback.
    fn before_completion(&self) {}

    /// Runs after a successful commit.
    fn after_commit(&self) {}

    /// Runs after commit or rollback.
    fn after_completion(&self, status: CompletionStatus) {
        let _ = status;
    }

    /// Runs when the owning transaction is suspended.
    fn suspend(&self) {}

    /// Runs when the owning transaction is resumed.
    fn resume(&self) {}
}

pub(crate) fn trigger_before_commit(read_only: bool) -> TxResult<()> {
    trace!("triggering before_commit synchronization");
    for sync in TransactionSynchronizationManager::synchronizations() {
        sync.before_commit(read_only)?;
    }
    Ok(())
}

pub(crate) fn trigger_before_completion() {
    trace!("triggering before_completion synchronization");
    for sync in TransactionSynchronizationManager::synchronizations() {
        sync.before_completion();
    }
}

pub(crate) fn trigger_after_commit() {
    trace!("triggering after_commit synchronization");
    for sync in TransactionSynchronizationManager::synchronizations() {
        sync.after_commit();
    }
}

pub(crate) fn trigger_after_completion(status: CompletionStatus) {
    trace!(?status, "triggering after_completion synchronization");
    for sync in TransactionSynchronizationManager::synchronizations() {
        sync.after_completion(status);
    }
}
