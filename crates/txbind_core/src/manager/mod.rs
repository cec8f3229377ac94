//! Transaction managers.
//!
//! [`SynchronousTransactionManager`] is the begin/commit/rollback contract.
//! [`ResourceTransactionManager`] narrows it to managers that operate on a
//! single native resource and exposes that resource's factory, typically so
//! callers can use it as the key into the per-thread binding registry.

mod holder;
mod single;
mod traits;

pub use holder::ConnectionHolder;
pub use single::SingleResourceTransactionManager;
pub use traits::{ResourceTransactionManager, SynchronousTransactionManager};
