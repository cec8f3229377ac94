//! The per-thread binding that represents an active transaction.

use crate::types::TransactionId;
use std::cell::Cell;
use std::fmt;
use std::time::{Duration, Instant};

/// What a manager binds under its factory's key while a transaction is active.
///
/// Look it up with
/// `TransactionSynchronizationManager::get_resource::<Rc<ConnectionHolder<C>>>(key)`.
pub struct ConnectionHolder<C> {
    transaction_id: TransactionId,
    connection: C,
    read_only: bool,
    deadline: Option<Instant>,
    rollback_only: Cell<bool>,
}

impl<C> ConnectionHolder<C> {
    pub(crate) fn new(
        transaction_id: TransactionId,
        connection: C,
        read_only: bool,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            transaction_id,
            connection,
            read_only,
            // a timeout too large for `Instant` never expires
            deadline: timeout.and_then(|timeout| Instant::now().checked_add(timeout)),
            rollback_only: Cell::new(false),
        }
    }

    /// Id of the transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// The transaction's connection.
    #[must_use]
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Whether the transaction was started read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// When the transaction times out, if it has a timeout.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// How far past its deadline the transaction is, if it is.
    #[must_use]
    pub fn overdue_by(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .filter(|deadline| now > *deadline)
            .map(|deadline| now - deadline)
    }

    /// Whether a participant marked the transaction rollback-only.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.get()
    }

    pub(crate) fn set_rollback_only(&self) {
        self.rollback_only.set(true);
    }
}

impl<C> fmt::Debug for ConnectionHolder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHolder")
            .field("transaction_id", &self.transaction_id)
            .field("read_only", &self.read_only)
            .field("deadline", &self.deadline)
            .field("rollback_only", &self.rollback_only.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_timeout_never_overdue() {
        let holder = ConnectionHolder::new(TransactionId::new(1), (), false, None);
        assert_eq!(holder.deadline(), None);
        assert_eq!(holder.overdue_by(Instant::now() + Duration::from_secs(60)), None);
    }

    #[test]
    fn overdue_after_deadline() {
        let holder = ConnectionHolder::new(
            TransactionId::new(1),
            (),
            false,
            Some(Duration::from_millis(5)),
        );
        let deadline = holder.deadline().unwrap();
        assert_eq!(holder.overdue_by(deadline), None);
        assert_eq!(
            holder.overdue_by(deadline + Duration::from_millis(3)),
            Some(Duration::from_millis(3))
        );
    }

    #[test]
    fn unrepresentable_deadline_means_no_deadline() {
        let holder = ConnectionHolder::new(TransactionId::new(1), (), false, Some(Duration::MAX));
        assert_eq!(holder.deadline(), None);
        assert_eq!(holder.overdue_by(Instant::now()), None);
    }

    #[test]
    fn rollback_only_is_sticky() {
        let holder = ConnectionHolder::new(TransactionId::new(9), (), true, None);
        assert!(!holder.is_rollback_only());
        holder.set_rollback_only();
        assert!(holder.is_rollback_only());
        assert!(holder.is_read_only());
    }
}
