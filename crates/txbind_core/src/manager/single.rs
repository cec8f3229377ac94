//! Transaction manager for a single resource factory.

use crate::config::TransactionConfig;
use crate::definition::{Propagation, TransactionDefinition};
use crate::error::{TransactionError, TxResult};
use crate::manager::holder::ConnectionHolder;
use crate::manager::traits::{ResourceTransactionManager, SynchronousTransactionManager};
use crate::resource::{ResourceFactory, TransactionalConnection};
use crate::status::{SuspendedResources, TransactionStatus};
use crate::support::{
    trigger_after_commit, trigger_after_completion, trigger_before_commit,
    trigger_before_completion, CompletionStatus, TransactionSynchronizationManager as Tsm,
};
use crate::types::{ResourceKey, TransactionId};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

type Holder<C> = Rc<ConnectionHolder<C>>;

/// Manages transactions on the connections of one [`ResourceFactory`].
///
/// While a transaction is active, its [`ConnectionHolder`] is bound on the
/// current thread under the factory's [`ResourceKey`]. Nested scopes find it
/// there and join it, suspend it, or refuse it according to their
/// [`Propagation`].
///
/// The manager itself is `Send + Sync` and can be shared between threads;
/// every thread runs its own, independent transactions.
///
/// ## Completion
///
/// - The scope that started the transaction commits or rolls back the
///   connection, fires synchronization callbacks, unbinds the holder and
///   closes the connection.
/// - A participating scope that rolls back marks the transaction
///   rollback-only; committing the outer scope then fails with
///   [`TransactionError::UnexpectedRollback`].
pub struct SingleResourceTransactionManager<F> {
    factory: Arc<F>,
    config: TransactionConfig,
    next_txid: AtomicU64,
}

impl<F: ResourceFactory> SingleResourceTransactionManager<F> {
    /// Creates a manager bound to `factory` for its whole lifetime.
    pub fn new(factory: Arc<F>, config: TransactionConfig) -> Self {
        Self {
            factory,
            config,
            next_txid: AtomicU64::new(1),
        }
    }

    /// The manager's configuration.
    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Key the manager binds its transactions under.
    #[must_use]
    pub fn resource_key(&self) -> ResourceKey {
        self.factory.resource_key()
    }

    /// Whether this manager has a transaction on the current thread.
    #[must_use]
    pub fn has_transaction(&self) -> bool {
        self.current_holder().is_some()
    }

    fn current_holder(&self) -> Option<Holder<F::Connection>> {
        Tsm::get_resource::<Holder<F::Connection>>(self.resource_key())
    }

    fn empty_status(
        definition: &TransactionDefinition,
        suspended: Option<SuspendedResources<F::Connection>>,
    ) -> TransactionStatus<F::Connection> {
        TransactionStatus::new(
            None,
            false,
            false,
            definition.read_only,
            definition.name.clone(),
            suspended,
        )
    }

    fn handle_existing_transaction(
        &self,
        definition: &TransactionDefinition,
        holder: Holder<F::Connection>,
    ) -> TxResult<TransactionStatus<F::Connection>> {
        let txid = holder.transaction_id();
        match definition.propagation {
            Propagation::Never => Err(TransactionError::illegal_state(
                "existing transaction found for transaction marked with propagation 'never'",
            )),
            Propagation::NotSupported => {
                debug!(txid = %txid, "suspending current transaction");
                let suspended = self.suspend();
                Ok(Self::empty_status(definition, Some(suspended)))
            }
            Propagation::RequiresNew => {
                debug!(txid = %txid, "suspending current transaction, creating new transaction");
                let suspended = self.suspend();
                self.start_transaction(definition, Some(suspended))
            }
            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                if self.config.validate_existing_transaction
                    && !definition.read_only
                    && holder.is_read_only()
                {
                    return Err(TransactionError::illegal_state(
                        "participating transaction is not read-only but existing transaction is",
                    ));
                }
                trace!(txid = %txid, "participating in existing transaction");
                Ok(TransactionStatus::new(
                    Some(holder),
                    false,
                    false,
                    definition.read_only,
                    definition.name.clone(),
                    None,
                ))
            }
        }
    }

    fn open_connection(&self, definition: &TransactionDefinition) -> TxResult<F::Connection> {
        let key = self.resource_key();
        let connection = self
            .factory
            .connect()
            .map_err(|err| TransactionError::cannot_create(key, err))?;
        if let Err(err) = connection.begin(definition) {
            if let Err(close_err) = connection.close() {
                warn!(resource = %key, error = %close_err, "could not close connection after failed begin");
            }
            return Err(TransactionError::cannot_create(key, err));
        }
        Ok(connection)
    }

    fn start_transaction(
        &self,
        definition: &TransactionDefinition,
        suspended: Option<SuspendedResources<F::Connection>>,
    ) -> TxResult<TransactionStatus<F::Connection>> {
        let key = self.resource_key();
        let connection = match self.open_connection(definition) {
            Ok(connection) => connection,
            Err(err) => {
                self.resume_after_failure(suspended);
                return Err(err);
            }
        };

        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::Relaxed));
        let timeout = definition.timeout.or(self.config.default_timeout);
        let holder = Rc::new(ConnectionHolder::new(
            txid,
            connection,
            definition.read_only,
            timeout,
        ));

        if let Err(err) = Tsm::bind_resource(key, Rc::clone(&holder)) {
            self.rollback_connection(holder.connection());
            if let Err(close_err) = holder.connection().close() {
                warn!(resource = %key, error = %close_err, "could not close unbound connection");
            }
            self.resume_after_failure(suspended);
            return Err(err);
        }

        let new_synchronization = !Tsm::is_synchronization_active();
        if new_synchronization {
            Tsm::init_synchronization()?;
            Tsm::set_actual_transaction_active(true);
            Tsm::set_current_transaction_read_only(definition.read_only);
            Tsm::set_current_transaction_name(definition.name.clone());
        }

        debug!(
            txid = %txid,
            resource = %key,
            propagation = %definition.propagation,
            read_only = definition.read_only,
            "began transaction"
        );
        Ok(TransactionStatus::new(
            Some(holder),
            true,
            new_synchronization,
            definition.read_only,
            definition.name.clone(),
            suspended,
        ))
    }

    fn suspend(&self) -> SuspendedResources<F::Connection> {
        let holder = Tsm::unbind_resource_if_possible::<Holder<F::Connection>>(self.resource_key());
        let synchronization = Tsm::suspend_synchronization();
        trace!(
            txid = ?holder.as_ref().map(|h| h.transaction_id()),
            "suspended transaction resources"
        );
        SuspendedResources {
            holder,
            synchronization,
        }
    }

    fn resume(&self, suspended: SuspendedResources<F::Connection>) -> TxResult<()> {
        let SuspendedResources {
            holder,
            synchronization,
        } = suspended;
        let rebound = match holder {
            Some(holder) => {
                trace!(txid = %holder.transaction_id(), "resuming suspended transaction");
                Tsm::bind_resource(self.resource_key(), holder)
            }
            None => Ok(()),
        };
        Tsm::resume_synchronization(synchronization);
        rebound
    }

    fn resume_after_failure(&self, suspended: Option<SuspendedResources<F::Connection>>) {
        if let Some(suspended) = suspended {
            if let Err(err) = self.resume(suspended) {
                error!(resource = %self.resource_key(), error = %err, "could not resume suspended transaction");
            }
        }
    }

    fn rollback_connection(&self, connection: &F::Connection) -> CompletionStatus {
        match connection.rollback() {
            Ok(()) => CompletionStatus::RolledBack,
            Err(err) => {
                warn!(resource = %self.resource_key(), error = %err, "connection rollback failed");
                CompletionStatus::Unknown
            }
        }
    }

    fn process_commit(&self, status: &mut TransactionStatus<F::Connection>) -> TxResult<()> {
        let outcome = self.commit_resources(status);
        let cleanup = self.cleanup_after_completion(status);
        outcome.and(cleanup)
    }

    fn commit_resources(&self, status: &TransactionStatus<F::Connection>) -> TxResult<()> {
        let new_synchronization = status.is_new_synchronization();
        let holder = status
            .holder()
            .filter(|_| status.is_new_transaction())
            .cloned();

        if let Some(holder) = &holder {
            if let Some(exceeded_by) = holder.overdue_by(Instant::now()) {
                warn!(txid = %holder.transaction_id(), ?exceeded_by, "transaction timed out, rolling back");
                if new_synchronization {
                    trigger_before_completion();
                }
                let completion = self.rollback_connection(holder.connection());
                if new_synchronization {
                    trigger_after_completion(completion);
                }
                return Err(TransactionError::TimedOut { exceeded_by });
            }
        }

        if new_synchronization {
            if let Err(err) = trigger_before_commit(status.is_read_only()) {
                debug!(error = %err, "synchronization vetoed commit, rolling back");
                trigger_before_completion();
                let completion = holder.as_ref().map_or(CompletionStatus::RolledBack, |holder| {
                    self.rollback_connection(holder.connection())
                });
                trigger_after_completion(completion);
                return Err(err);
            }
            trigger_before_completion();
        }

        if let Some(holder) = &holder {
            debug!(txid = %holder.transaction_id(), resource = %self.resource_key(), "committing transaction");
            if let Err(err) = holder.connection().commit() {
                let completion = if self.config.rollback_on_commit_failure {
                    self.rollback_connection(holder.connection())
                } else {
                    CompletionStatus::Unknown
                };
                if new_synchronization {
                    trigger_after_completion(completion);
                }
                return Err(err);
            }
        }

        if new_synchronization {
            trigger_after_commit();
            trigger_after_completion(CompletionStatus::Committed);
        }
        Ok(())
    }

    fn process_rollback(&self, status: &mut TransactionStatus<F::Connection>) -> TxResult<()> {
        let outcome = self.rollback_resources(status);
        let cleanup = self.cleanup_after_completion(status);
        outcome.and(cleanup)
    }

    fn rollback_resources(&self, status: &TransactionStatus<F::Connection>) -> TxResult<()> {
        let new_synchronization = status.is_new_synchronization();
        if new_synchronization {
            trigger_before_completion();
        }

        let mut outcome = Ok(());
        let mut completion = CompletionStatus::RolledBack;
        match status.holder() {
            Some(holder) if status.is_new_transaction() => {
                debug!(txid = %holder.transaction_id(), resource = %self.resource_key(), "rolling back transaction");
                if let Err(err) = holder.connection().rollback() {
                    completion = CompletionStatus::Unknown;
                    outcome = Err(err);
                }
            }
            Some(holder) => {
                debug!(
                    txid = %holder.transaction_id(),
                    "participating transaction failed, marking existing transaction as rollback-only"
                );
                holder.set_rollback_only();
            }
            None => trace!("no transaction to roll back"),
        }

        if new_synchronization {
            trigger_after_completion(completion);
        }
        outcome
    }

    fn cleanup_after_completion(&self, status: &mut TransactionStatus<F::Connection>) -> TxResult<()> {
        status.mark_completed();
        if status.is_new_synchronization() {
            Tsm::clear();
        }
        if status.is_new_transaction() {
            let key = self.resource_key();
            Tsm::unbind_resource_if_possible::<Holder<F::Connection>>(key);
            if let Some(holder) = status.holder() {
                if let Err(err) = holder.connection().close() {
                    warn!(resource = %key, error = %err, "could not close connection after transaction");
                }
                debug!(txid = %holder.transaction_id(), resource = %key, "released transaction connection");
            }
        }
        match status.take_suspended() {
            Some(suspended) => self.resume(suspended),
            None => Ok(()),
        }
    }
}

impl<F: ResourceFactory> SynchronousTransactionManager<F::Connection>
    for SingleResourceTransactionManager<F>
{
    fn get_transaction(
        &self,
        definition: &TransactionDefinition,
    ) -> TxResult<TransactionStatus<F::Connection>> {
        if let Some(holder) = self.current_holder() {
            return self.handle_existing_transaction(definition, holder);
        }
        match definition.propagation {
            Propagation::Mandatory => Err(TransactionError::no_transaction(
                "no existing transaction found for transaction marked with propagation 'mandatory'",
            )),
            Propagation::Required | Propagation::RequiresNew => {
                self.start_transaction(definition, None)
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                trace!(propagation = %definition.propagation, "running without transaction");
                Ok(Self::empty_status(definition, None))
            }
        }
    }

    fn commit(&self, status: &mut TransactionStatus<F::Connection>) -> TxResult<()> {
        if status.is_completed() {
            return Err(TransactionError::illegal_state(
                "transaction is already completed - do not call commit or rollback more than once per transaction",
            ));
        }

        if status.is_local_rollback_only() {
            debug!(txid = ?status.id(), "transactional code requested rollback");
            return self.process_rollback(status);
        }

        if status.is_global_rollback_only() {
            debug!(
                txid = ?status.id(),
                "transaction is marked rollback-only but commit was requested"
            );
            let new_transaction = status.is_new_transaction();
            self.process_rollback(status)?;
            if new_transaction {
                return Err(TransactionError::UnexpectedRollback);
            }
            return Ok(());
        }

        self.process_commit(status)
    }

    fn rollback(&self, status: &mut TransactionStatus<F::Connection>) -> TxResult<()> {
        if status.is_completed() {
            return Err(TransactionError::illegal_state(
                "transaction is already completed - do not call commit or rollback more than once per transaction",
            ));
        }
        self.process_rollback(status)
    }

    fn connection(&self) -> TxResult<F::Connection> {
        self.current_holder()
            .map(|holder| holder.connection().clone())
            .ok_or_else(|| {
                TransactionError::no_transaction(format!(
                    "no connection bound for {} on this thread",
                    self.resource_key()
                ))
            })
    }
}

impl<F: ResourceFactory> ResourceTransactionManager<Arc<F>, F::Connection>
    for SingleResourceTransactionManager<F>
{
    fn resource_factory(&self) -> &Arc<F> {
        &self.factory
    }
}

impl<F> std::fmt::Debug for SingleResourceTransactionManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleResourceTransactionManager")
            .field("config", &self.config)
            .field("next_txid", &self.next_txid.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
