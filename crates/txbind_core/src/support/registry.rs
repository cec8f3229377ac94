//! Per-thread resource bindings.
//!
//! Every thread owns an independent registry. Nothing here is shared between
//! threads, so no locking is involved: a binding made on one thread is
//! invisible on every other thread.

use crate::error::{TransactionError, TxResult};
use crate::support::synchronization::TransactionSynchronization;
use crate::types::ResourceKey;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use tracing::trace;

#[derive(Default)]
struct ThreadState {
    resources: HashMap<ResourceKey, Box<dyn Any>>,
    /// `None` while synchronization is inactive.
    synchronizations: Option<Vec<Rc<dyn TransactionSynchronization>>>,
    current_name: Option<String>,
    current_read_only: bool,
    actual_active: bool,
}

thread_local! {
    static STATE: RefCell<ThreadState> = RefCell::new(ThreadState::default());
}

/// Synchronization state detached from the thread while a transaction is suspended.
pub(crate) struct SynchronizationSnapshot {
    synchronizations: Option<Vec<Rc<dyn TransactionSynchronization>>>,
    name: Option<String>,
    read_only: bool,
    actual_active: bool,
}

impl std::fmt::Debug for SynchronizationSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizationSnapshot")
            .field(
                "synchronizations",
                &self.synchronizations.as_ref().map(Vec::len),
            )
            .field("name", &self.name)
            .field("read_only", &self.read_only)
            .field("actual_active", &self.actual_active)
            .finish()
    }
}

/// Access point for the current thread's resource bindings and
/// synchronization callbacks.
///
/// Transaction managers bind a connection holder under their resource
/// factory's [`ResourceKey`] for the duration of a transaction. Code running
/// inside the transaction can look the holder up with the same key without
/// knowing which manager created it.
///
/// ```rust
/// use txbind_core::{ResourceKey, TransactionSynchronizationManager as Tsm};
///
/// let key = ResourceKey::generate();
/// Tsm::bind_resource(key, String::from("session")).unwrap();
/// assert_eq!(Tsm::get_resource::<String>(key).as_deref(), Some("session"));
/// let session: String = Tsm::unbind_resource(key).unwrap();
/// assert_eq!(session, "session");
/// assert!(!Tsm::has_resource(key));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionSynchronizationManager;

impl TransactionSynchronizationManager {
    /// Binds `value` under `key` on the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::ResourceAlreadyBound`] if the key is taken.
    pub fn bind_resource<V: Any>(key: ResourceKey, value: V) -> TxResult<()> {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.resources.contains_key(&key) {
                return Err(TransactionError::ResourceAlreadyBound { key });
            }
            state.resources.insert(key, Box::new(value));
            trace!(resource = %key, "bound resource to thread");
            Ok(())
        })
    }

    /// Returns a clone of the value bound under `key`, if it has type `V`.
    #[must_use]
    pub fn get_resource<V: Any + Clone>(key: ResourceKey) -> Option<V> {
        STATE.with(|state| {
            state
                .borrow()
                .resources
                .get(&key)
                .and_then(|value| value.downcast_ref::<V>())
                .cloned()
        })
    }

    /// Returns whether anything is bound under `key`.
    #[must_use]
    pub fn has_resource(key: ResourceKey) -> bool {
        STATE.with(|state| state.borrow().resources.contains_key(&key))
    }

    /// Removes and returns the value bound under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NoResourceBound`] if nothing is bound, or
    /// [`TransactionError::IllegalTransactionState`] if the bound value is not
    /// a `V` (the binding is left in place).
    pub fn unbind_resource<V: Any>(key: ResourceKey) -> TxResult<V> {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            let value = state
                .resources
                .remove(&key)
                .ok_or(TransactionError::NoResourceBound { key })?;
            match value.downcast::<V>() {
                Ok(value) => {
                    trace!(resource = %key, "unbound resource from thread");
                    Ok(*value)
                }
                Err(value) => {
                    state.resources.insert(key, value);
                    Err(TransactionError::illegal_state(format!(
                        "resource bound for {key} has a different type"
                    )))
                }
            }
        })
    }

    /// Removes and returns the value bound under `key` if there is one of type `V`.
    pub fn unbind_resource_if_possible<V: Any>(key: ResourceKey) -> Option<V> {
        Self::unbind_resource(key).ok()
    }

    /// Number of resources bound on this thread.
    #[must_use]
    pub fn resource_count() -> usize {
        STATE.with(|state| state.borrow().resources.len())
    }

    /// Activates synchronization for the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::IllegalTransactionState`] if already active.
    pub fn init_synchronization() -> TxResult<()> {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.synchronizations.is_some() {
                return Err(TransactionError::illegal_state(
                    "cannot activate transaction synchronization - already active",
                ));
            }
            state.synchronizations = Some(Vec::new());
            Ok(())
        })
    }

    /// Returns whether synchronization is active on this thread.
    #[must_use]
    pub fn is_synchronization_active() -> bool {
        STATE.with(|state| state.borrow().synchronizations.is_some())
    }

    /// Registers a callback for the current thread's transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::IllegalTransactionState`] if synchronization is inactive.
    pub fn register_synchronization(sync: Rc<dyn TransactionSynchronization>) -> TxResult<()> {
        STATE.with(|state| match state.borrow_mut().synchronizations.as_mut() {
            Some(list) => {
                list.push(sync);
                Ok(())
            }
            None => Err(TransactionError::illegal_state(
                "transaction synchronization is not active",
            )),
        })
    }

    /// Snapshot of the registered callbacks, in registration order.
    ///
    /// Empty when synchronization is inactive.
    #[must_use]
    pub fn synchronizations() -> Vec<Rc<dyn TransactionSynchronization>> {
        STATE.with(|state| state.borrow().synchronizations.clone().unwrap_or_default())
    }

    /// Deactivates synchronization, dropping registered callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::IllegalTransactionState`] if not active.
    pub fn clear_synchronization() -> TxResult<()> {
        STATE.with(|state| {
            if state.borrow_mut().synchronizations.take().is_none() {
                return Err(TransactionError::illegal_state(
                    "cannot deactivate transaction synchronization - not active",
                ));
            }
            Ok(())
        })
    }

    /// Sets the name of the current transaction.
    pub fn set_current_transaction_name(name: Option<String>) {
        STATE.with(|state| state.borrow_mut().current_name = name);
    }

    /// Name of the current transaction, if any.
    #[must_use]
    pub fn current_transaction_name() -> Option<String> {
        STATE.with(|state| state.borrow().current_name.clone())
    }

    /// Marks the current transaction read-only or read-write.
    pub fn set_current_transaction_read_only(read_only: bool) {
        STATE.with(|state| state.borrow_mut().current_read_only = read_only);
    }

    /// Whether the current transaction is read-only.
    #[must_use]
    pub fn is_current_transaction_read_only() -> bool {
        STATE.with(|state| state.borrow().current_read_only)
    }

    /// Records whether a native transaction is active on this thread.
    pub fn set_actual_transaction_active(active: bool) {
        STATE.with(|state| state.borrow_mut().actual_active = active);
    }

    /// Whether a native transaction is active on this thread.
    #[must_use]
    pub fn is_actual_transaction_active() -> bool {
        STATE.with(|state| state.borrow().actual_active)
    }

    /// Clears synchronization state: callbacks, name, read-only and active flags.
    ///
    /// Resource bindings are left untouched.
    pub fn clear() {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.synchronizations = None;
            state.current_name = None;
            state.current_read_only = false;
            state.actual_active = false;
        });
    }

    /// Detaches the synchronization state, invoking `suspend` on each callback.
    pub(crate) fn suspend_synchronization() -> SynchronizationSnapshot {
        let snapshot = STATE.with(|state| {
            let mut state = state.borrow_mut();
            SynchronizationSnapshot {
                synchronizations: state.synchronizations.take(),
                name: state.current_name.take(),
                read_only: mem::take(&mut state.current_read_only),
                actual_active: mem::take(&mut state.actual_active),
            }
        });
        for sync in snapshot.synchronizations.iter().flatten() {
            sync.suspend();
        }
        snapshot
    }

    /// Re-attaches a detached synchronization state, invoking `resume` on each callback.
    pub(crate) fn resume_synchronization(snapshot: SynchronizationSnapshot) {
        for sync in snapshot.synchronizations.iter().flatten() {
            sync.resume();
        }
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.synchronizations = snapshot.synchronizations;
            state.current_name = snapshot.name;
            state.current_read_only = snapshot.read_only;
            state.actual_active = snapshot.actual_active;
        });
    }
}
