//! Per-thread transaction support: resource bindings and synchronization callbacks.

mod registry;
mod synchronization;

pub use registry::TransactionSynchronizationManager;
pub(crate) use registry::SynchronizationSnapshot;
pub use synchronization::{CompletionStatus, TransactionSynchronization};
pub(crate) use synchronization::{
    trigger_after_commit, trigger_after_completion, trigger_before_commit,
    trigger_before_completion,
};
