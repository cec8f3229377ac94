//! # txbind core
//!
//! Transaction managers that operate on exactly one native resource.
//!
//! This crate provides:
//! - [`SynchronousTransactionManager`]: begin/commit/rollback over a connection type
//! - [`ResourceTransactionManager`]: the same, plus access to the bound resource factory
//! - [`TransactionSynchronizationManager`]: per-thread resource bindings and callbacks
//! - [`SingleResourceTransactionManager`]: a manager for any [`ResourceFactory`]
//! - [`BackendFactory`]: a resource factory over a `txbind_storage` backend
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use txbind_core::{
//!     BackendFactory, ResourceTransactionManager, SingleResourceTransactionManager,
//!     SynchronousTransactionManager, TransactionConfig,
//! };
//!
//! let factory = Arc::new(BackendFactory::in_memory());
//! let manager = SingleResourceTransactionManager::new(Arc::clone(&factory), TransactionConfig::default());
//!
//! manager
//!     .execute_write(|status| {
//!         let conn = status.connection().expect("transaction is active");
//!         conn.append(b"hello")
//!     })
//!     .unwrap();
//!
//! assert!(Arc::ptr_eq(manager.resource_factory(), &factory));
//! assert_eq!(factory.read_committed(0, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod definition;
mod error;
mod manager;
mod resource;
mod status;
mod support;
mod types;

pub use config::TransactionConfig;
pub use definition::{Propagation, TransactionDefinition};
pub use error::{TransactionError, TxResult};
pub use manager::{
    ConnectionHolder, ResourceTransactionManager, SingleResourceTransactionManager,
    SynchronousTransactionManager,
};
pub use resource::{BackendConnection, BackendFactory, ResourceFactory, TransactionalConnection};
pub use status::TransactionStatus;
pub use support::{CompletionStatus, TransactionSynchronization, TransactionSynchronizationManager};
pub use types::{ResourceKey, TransactionId};
