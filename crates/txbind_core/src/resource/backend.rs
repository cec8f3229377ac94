//! Resource factory over a storage backend.

use crate::definition::TransactionDefinition;
use crate::error::{TransactionError, TxResult};
use crate::resource::{ResourceFactory, TransactionalConnection};
use crate::types::ResourceKey;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use txbind_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError};

type SharedBackend = Arc<Mutex<Box<dyn StorageBackend>>>;

/// A resource factory whose connections write to one shared [`StorageBackend`].
///
/// Outside a transaction a connection writes straight through. Inside one,
/// writes are buffered on the connection and land in the backend with a
/// single append when the transaction commits.
pub struct BackendFactory {
    key: ResourceKey,
    backend: SharedBackend,
    sync_on_commit: bool,
}

impl BackendFactory {
    /// Wraps `backend` under a freshly generated key.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            key: ResourceKey::generate(),
            backend: Arc::new(Mutex::new(backend)),
            sync_on_commit: false,
        }
    }

    /// A factory over an empty [`InMemoryBackend`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryBackend::new()))
    }

    /// A factory over a [`FileBackend`] at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open_file(path: &Path) -> TxResult<Self> {
        Ok(Self::new(Box::new(FileBackend::open_with_create_dirs(path)?)))
    }

    /// Whether commits `sync` instead of `flush` the backend.
    #[must_use]
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Bytes committed to the backend so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn committed_size(&self) -> TxResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads committed bytes, ignoring any connection's pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds.
    pub fn read_committed(&self, offset: u64, len: usize) -> TxResult<Vec<u8>> {
        Ok(self.backend.lock().read_at(offset, len)?)
    }
}

impl std::fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFactory")
            .field("key", &self.key)
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

impl ResourceFactory for BackendFactory {
    type Connection = BackendConnection;

    fn resource_key(&self) -> ResourceKey {
        self.key
    }

    fn connect(&self) -> TxResult<BackendConnection> {
        trace!(resource = %self.key, "opening backend connection");
        Ok(BackendConnection {
            key: self.key,
            backend: Arc::clone(&self.backend),
            session: Arc::new(Mutex::new(Session::default())),
            sync_on_commit: self.sync_on_commit,
        })
    }
}

#[derive(Debug, Default)]
struct Session {
    pending: Option<PendingWrites>,
    closed: bool,
}

#[derive(Debug)]
struct PendingWrites {
    read_only: bool,
    buffer: Vec<u8>,
}

/// A connection produced by [`BackendFactory`].
///
/// Clones share one session. Reads inside a transaction see the committed
/// bytes followed by this connection's own pending bytes.
///
/// Lock order: backend before session.
#[derive(Clone)]
pub struct BackendConnection {
    key: ResourceKey,
    backend: SharedBackend,
    session: Arc<Mutex<Session>>,
    sync_on_commit: bool,
}

impl BackendConnection {
    /// Key of the factory that opened this connection.
    #[must_use]
    pub fn resource_key(&self) -> ResourceKey {
        self.key
    }

    /// Appends `data`.
    ///
    /// Buffered until commit inside a transaction; written and flushed
    /// immediately otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::ReadOnly`] inside a read-only transaction,
    /// [`TransactionError::ConnectionClosed`] after close, or a storage error.
    pub fn append(&self, data: &[u8]) -> TxResult<()> {
        let mut backend = self.backend.lock();
        let mut session = self.session.lock();
        self.ensure_open(&session)?;
        match session.pending.as_mut() {
            Some(pending) if pending.read_only => Err(TransactionError::ReadOnly),
            Some(pending) => {
                pending.buffer.extend_from_slice(data);
                Ok(())
            }
            None => {
                let before = backend.size()?;
                if let Err(err) = backend.append(data).and_then(|_| backend.flush()) {
                    if let Err(undo) = backend.truncate(before) {
                        warn!(resource = %self.key, error = %undo, "could not undo failed write");
                    }
                    return Err(err.into());
                }
                Ok(())
            }
        }
    }

    /// Reads `len` bytes at `offset` from committed data plus this
    /// connection's pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Storage`] if the range is out of bounds.
    pub fn read_at(&self, offset: u64, len: usize) -> TxResult<Vec<u8>> {
        let backend = self.backend.lock();
        let session = self.session.lock();
        self.ensure_open(&session)?;
        let committed = backend.size()?;
        let pending = session
            .pending
            .as_ref()
            .map_or(&[][..], |pending| pending.buffer.as_slice());
        let end = offset.saturating_add(len as u64);

        if end <= committed {
            return Ok(backend.read_at(offset, len)?);
        }
        let size = committed + pending.len() as u64;
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size }.into());
        }

        let mut out = Vec::with_capacity(len);
        if offset < committed {
            out.extend(backend.read_at(offset, (committed - offset) as usize)?);
        }
        let from = offset.saturating_sub(committed) as usize;
        let to = (end - committed) as usize;
        out.extend_from_slice(&pending[from..to]);
        Ok(out)
    }

    /// Committed size plus pending bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::ConnectionClosed`] after close, or an
    /// error if the backend cannot report its size.
    pub fn size(&self) -> TxResult<u64> {
        let backend = self.backend.lock();
        let session = self.session.lock();
        self.ensure_open(&session)?;
        Ok(backend.size()? + session.pending.as_ref().map_or(0, |p| p.buffer.len() as u64))
    }

    /// Bytes buffered by the current transaction.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.session
            .lock()
            .pending
            .as_ref()
            .map_or(0, |pending| pending.buffer.len())
    }

    /// Whether a native transaction is in progress.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.session.lock().pending.is_some()
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.session.lock().closed
    }

    fn ensure_open(&self, session: &Session) -> TxResult<()> {
        if session.closed {
            return Err(TransactionError::ConnectionClosed { key: self.key });
        }
        Ok(())
    }

    fn take_pending(&self, session: &mut Session) -> TxResult<PendingWrites> {
        self.ensure_open(session)?;
        session
            .pending
            .take()
            .ok_or_else(|| TransactionError::no_transaction("connection has no open transaction"))
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("key", &self.key)
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

impl TransactionalConnection for BackendConnection {
    fn begin(&self, definition: &TransactionDefinition) -> TxResult<()> {
        let mut session = self.session.lock();
        self.ensure_open(&session)?;
        if session.pending.is_some() {
            return Err(TransactionError::illegal_state(
                "connection already has an open transaction",
            ));
        }
        session.pending = Some(PendingWrites {
            read_only: definition.read_only,
            buffer: Vec::new(),
        });
        Ok(())
    }

    fn commit(&self) -> TxResult<()> {
        let mut backend = self.backend.lock();
        let mut session = self.session.lock();
        let pending = self.take_pending(&mut session)?;
        if pending.buffer.is_empty() {
            trace!(resource = %self.key, "nothing to commit");
            return Ok(());
        }

        let before = backend.size()?;
        let written = backend.append(&pending.buffer).and_then(|_| {
            if self.sync_on_commit {
                backend.sync()
            } else {
                backend.flush()
            }
        });
        if let Err(err) = written {
            if let Err(undo) = backend.truncate(before) {
                warn!(resource = %self.key, error = %undo, "could not undo partial commit");
            }
            // keep the writes so the caller can still roll back
            session.pending = Some(pending);
            return Err(err.into());
        }

        debug!(resource = %self.key, bytes = pending.buffer.len(), "committed connection writes");
        Ok(())
    }

    fn rollback(&self) -> TxResult<()> {
        let mut session = self.session.lock();
        let pending = self.take_pending(&mut session)?;
        debug!(resource = %self.key, bytes = pending.buffer.len(), "discarded connection writes");
        Ok(())
    }

    fn close(&self) -> TxResult<()> {
        let mut session = self.session.lock();
        if let Some(pending) = session.pending.take() {
            warn!(
                resource = %self.key,
                bytes = pending.buffer.len(),
                "closing connection with an open transaction, discarding writes"
            );
        }
        session.closed = true;
        Ok(())
    }
}
