//! Transaction status handed out by a manager.

use crate::manager::ConnectionHolder;
use crate::support::SynchronizationSnapshot;
use crate::types::TransactionId;
use std::fmt;
use std::rc::Rc;

/// Outer-transaction state detached from the thread while an inner scope runs.
pub(crate) struct SuspendedResources<C> {
    pub(crate) holder: Option<Rc<ConnectionHolder<C>>>,
    pub(crate) synchronization: SynchronizationSnapshot,
}

impl<C> fmt::Debug for SuspendedResources<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendedResources")
            .field("transaction", &self.holder.as_ref().map(|h| h.transaction_id()))
            .field("synchronization", &self.synchronization)
            .finish()
    }
}

/// The handle for one transactional scope.
///
/// A status either started the native transaction (`is_new_transaction`),
/// participates in one started by an enclosing scope, or runs without a
/// transaction at all (`has_transaction() == false`). It must be passed to
/// exactly one of `commit` or `rollback`.
///
/// A status is tied to the thread that created it.
pub struct TransactionStatus<C> {
    holder: Option<Rc<ConnectionHolder<C>>>,
    new_transaction: bool,
    new_synchronization: bool,
    read_only: bool,
    name: Option<String>,
    rollback_only: bool,
    completed: bool,
    suspended: Option<SuspendedResources<C>>,
}

impl<C> TransactionStatus<C> {
    pub(crate) fn new(
        holder: Option<Rc<ConnectionHolder<C>>>,
        new_transaction: bool,
        new_synchronization: bool,
        read_only: bool,
        name: Option<String>,
        suspended: Option<SuspendedResources<C>>,
    ) -> Self {
        Self {
            holder,
            new_transaction,
            new_synchronization,
            read_only,
            name,
            rollback_only: false,
            completed: false,
            suspended,
        }
    }

    /// Id of the underlying transaction, if there is one.
    #[must_use]
    pub fn id(&self) -> Option<TransactionId> {
        self.holder.as_ref().map(|holder| holder.transaction_id())
    }

    /// The connection of the underlying transaction, if there is one.
    #[must_use]
    pub fn connection(&self) -> Option<&C> {
        self.holder.as_ref().map(|holder| holder.connection())
    }

    /// Whether this scope runs inside a native transaction.
    #[must_use]
    pub fn has_transaction(&self) -> bool {
        self.holder.is_some()
    }

    /// Whether this scope started the native transaction.
    #[must_use]
    pub fn is_new_transaction(&self) -> bool {
        self.has_transaction() && self.new_transaction
    }

    /// Whether this scope owns the thread's synchronization callbacks.
    #[must_use]
    pub fn is_new_synchronization(&self) -> bool {
        self.new_synchronization
    }

    /// Whether the definition asked for a read-only transaction.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Name from the definition.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Marks this scope so that the only possible outcome is rollback.
    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// Whether this scope, or the transaction it participates in, is rollback-only.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.is_local_rollback_only() || self.is_global_rollback_only()
    }

    /// Whether `set_rollback_only` was called on this status.
    #[must_use]
    pub fn is_local_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Whether a participant marked the underlying transaction rollback-only.
    #[must_use]
    pub fn is_global_rollback_only(&self) -> bool {
        self.holder
            .as_ref()
            .is_some_and(|holder| holder.is_rollback_only())
    }

    /// Whether commit or rollback already ran.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether an outer transaction was suspended for this scope.
    #[must_use]
    pub fn has_suspended_resources(&self) -> bool {
        self.suspended.is_some()
    }

    pub(crate) fn holder(&self) -> Option<&Rc<ConnectionHolder<C>>> {
        self.holder.as_ref()
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub(crate) fn take_suspended(&mut self) -> Option<SuspendedResources<C>> {
        self.suspended.take()
    }
}

impl<C> fmt::Debug for TransactionStatus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("id", &self.id())
            .field("new_transaction", &self.is_new_transaction())
            .field("read_only", &self.read_only)
            .field("rollback_only", &self.is_rollback_only())
            .field("completed", &self.completed)
            .field("suspended", &self.suspended)
            .finish_non_exhaustive()
    }
}
