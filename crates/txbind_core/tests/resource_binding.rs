//! Integration tests for resource-bound transaction managers.

use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use txbind_core::{
    BackendFactory, ConnectionHolder, Propagation, ResourceFactory, ResourceKey,
    ResourceTransactionManager, SingleResourceTransactionManager, SynchronousTransactionManager,
    TransactionConfig, TransactionDefinition, TransactionError, TransactionSynchronizationManager,
    TransactionalConnection, TxResult,
};

/// A resource that only counts native transaction outcomes.
struct CountingFactory {
    key: ResourceKey,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
    refuse_begin: bool,
}

impl CountingFactory {
    fn new() -> Self {
        Self {
            key: ResourceKey::generate(),
            commits: Arc::new(AtomicUsize::new(0)),
            rollbacks: Arc::new(AtomicUsize::new(0)),
            refuse_begin: false,
        }
    }
}

#[derive(Clone)]
struct CountingConnection {
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
    refuse_begin: bool,
    closed: Rc<Cell<bool>>,
}

impl TransactionalConnection for CountingConnection {
    fn begin(&self, _definition: &TransactionDefinition) -> TxResult<()> {
        if self.refuse_begin {
            return Err(TransactionError::illegal_state("resource unavailable"));
        }
        Ok(())
    }

    fn commit(&self) -> TxResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> TxResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> TxResult<()> {
        self.closed.set(true);
        Ok(())
    }
}

impl ResourceFactory for CountingFactory {
    type Connection = CountingConnection;

    fn resource_key(&self) -> ResourceKey {
        self.key
    }

    fn connect(&self) -> TxResult<CountingConnection> {
        Ok(CountingConnection {
            commits: Arc::clone(&self.commits),
            rollbacks: Arc::clone(&self.rollbacks),
            refuse_begin: self.refuse_begin,
            closed: Rc::new(Cell::new(false)),
        })
    }
}

/// Finds the connection a manager's transaction runs on, knowing only that
/// it is a resource transaction manager.
fn bound_connection<M, F>(manager: &M) -> Option<F::Connection>
where
    M: ResourceTransactionManager<Arc<F>, F::Connection>,
    F: ResourceFactory,
{
    let key = manager.resource_factory().resource_key();
    TransactionSynchronizationManager::get_resource::<Rc<ConnectionHolder<F::Connection>>>(key)
        .map(|holder| holder.connection().clone())
}

#[test]
fn accessor_returns_same_factory_every_time() {
    let f1 = Arc::new(BackendFactory::in_memory());
    let manager = SingleResourceTransactionManager::new(Arc::clone(&f1), TransactionConfig::default());

    let first = manager.resource_factory();
    let second = manager.resource_factory();
    assert!(Arc::ptr_eq(first, second));
    assert!(Arc::ptr_eq(first, &f1));
    assert_eq!(first.resource_key(), second.resource_key());
}

#[test]
fn distinct_factories_stay_distinguishable() {
    let f1 = Arc::new(BackendFactory::in_memory());
    let f2 = Arc::new(BackendFactory::in_memory());
    let m1 = SingleResourceTransactionManager::new(Arc::clone(&f1), TransactionConfig::default());
    let m2 = SingleResourceTransactionManager::new(Arc::clone(&f2), TransactionConfig::default());

    assert!(Arc::ptr_eq(m2.resource_factory(), &f2));
    assert!(!Arc::ptr_eq(m2.resource_factory(), &f1));
    assert!(!Arc::ptr_eq(m1.resource_factory(), m2.resource_factory()));
    assert_ne!(
        m1.resource_factory().resource_key(),
        m2.resource_factory().resource_key()
    );
}

#[test]
fn accessor_is_usable_from_many_threads() {
    let factory = Arc::new(BackendFactory::in_memory());
    let manager = Arc::new(SingleResourceTransactionManager::new(
        Arc::clone(&factory),
        TransactionConfig::default(),
    ));
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            let factory = Arc::clone(&factory);
            scope.spawn(move || {
                assert!(Arc::ptr_eq(manager.resource_factory(), &factory));
            });
        }
    });
}

#[test]
fn factory_key_locates_the_bound_connection() {
    let manager = SingleResourceTransactionManager::new(
        Arc::new(BackendFactory::in_memory()),
        TransactionConfig::default(),
    );
    assert!(bound_connection::<_, BackendFactory>(&manager).is_none());

    manager
        .execute_write(|status| {
            let conn = bound_connection::<_, BackendFactory>(&manager).expect("transaction binds a connection");
            conn.append(b"found via key")?;
            assert_eq!(status.connection().map(|c| c.pending_len()), Some(13));
            Ok(())
        })
        .unwrap();

    assert!(bound_connection::<_, BackendFactory>(&manager).is_none());
    let factory = manager.resource_factory();
    assert_eq!(factory.read_committed(0, 13).unwrap(), b"found via key");
}

#[test]
fn custom_factory_outcomes_reach_the_resource() {
    let factory = Arc::new(CountingFactory::new());
    let manager = SingleResourceTransactionManager::new(Arc::clone(&factory), TransactionConfig::default());

    manager.execute_write(|_| Ok(())).unwrap();
    let failed: TxResult<()> = manager.execute_write(|_| Err(TransactionError::ReadOnly));
    assert!(failed.is_err());

    let mut outer = manager.get_transaction(&TransactionDefinition::DEFAULT).unwrap();
    let mut inner = manager
        .get_transaction(&TransactionDefinition::of(Propagation::RequiresNew))
        .unwrap();
    manager.commit(&mut inner).unwrap();
    manager.commit(&mut outer).unwrap();

    assert!(inner.connection().unwrap().closed.get());
    assert_eq!(factory.commits.load(Ordering::SeqCst), 3);
    assert_eq!(factory.rollbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn begin_failure_is_reported_and_leaves_no_binding() {
    let factory = Arc::new(CountingFactory {
        refuse_begin: true,
        ..CountingFactory::new()
    });
    let key = factory.resource_key();
    let manager = SingleResourceTransactionManager::new(factory, TransactionConfig::default());

    let err = manager
        .get_transaction(&TransactionDefinition::DEFAULT)
        .unwrap_err();
    assert!(matches!(err, TransactionError::CannotCreateTransaction { key: k, .. } if k == key));
    assert!(!TransactionSynchronizationManager::has_resource(key));
    assert!(!TransactionSynchronizationManager::is_synchronization_active());
}

#[test]
fn file_backed_transactions_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.bin");
    {
        let factory = Arc::new(BackendFactory::open_file(&path).unwrap().sync_on_commit(true));
        let manager = SingleResourceTransactionManager::new(factory, TransactionConfig::default());
        manager
            .execute_write(|status| {
                let conn = status.connection().expect("active");
                conn.append(b"credit:100;")?;
                conn.append(b"debit:40;")
            })
            .unwrap();
        let rolled_back: TxResult<()> = manager.execute_write(|status| {
            status.connection().expect("active").append(b"debit:999;")?;
            Err(TransactionError::illegal_state("insufficient funds"))
        });
        assert!(rolled_back.is_err());
    }

    let reopened = BackendFactory::open_file(&path).unwrap();
    assert_eq!(reopened.committed_size().unwrap(), 20);
    assert_eq!(reopened.read_committed(0, 20).unwrap(), b"credit:100;debit:40;");
}

proptest! {
    #[test]
    fn every_factory_gets_its_own_key(count in 2usize..32) {
        let managers: Vec<_> = (0..count)
            .map(|_| SingleResourceTransactionManager::new(
                Arc::new(BackendFactory::in_memory()),
                TransactionConfig::default(),
            ))
            .collect();
        let mut keys: Vec<_> = managers
            .iter()
            .map(|m| m.resource_factory().resource_key())
            .collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), count);
        for manager in &managers {
            prop_assert!(Arc::ptr_eq(manager.resource_factory(), manager.resource_factory()));
        }
    }

    #[test]
    fn nested_required_scopes_commit_once(depth in 1usize..8) {
        let factory = Arc::new(CountingFactory::new());
        let manager = SingleResourceTransactionManager::new(Arc::clone(&factory), TransactionConfig::default());

        let mut statuses = Vec::new();
        for _ in 0..depth {
            statuses.push(manager.get_transaction(&TransactionDefinition::DEFAULT).unwrap());
        }
        prop_assert!(statuses[0].is_new_transaction());
        prop_assert!(statuses[1..].iter().all(|s| !s.is_new_transaction()));

        while let Some(mut status) = statuses.pop() {
            manager.commit(&mut status).unwrap();
        }
        prop_assert_eq!(factory.commits.load(Ordering::SeqCst), 1);
        prop_assert_eq!(factory.rollbacks.load(Ordering::SeqCst), 0);
    }
}
