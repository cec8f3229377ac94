//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use std::sync::Arc;
use txbind_core::{BackendFactory, SingleResourceTransactionManager, TransactionConfig};

/// Random payload of `size` bytes.
pub fn random_payload(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A manager over a fresh in-memory resource.
pub fn in_memory_manager() -> SingleResourceTransactionManager<BackendFactory> {
    SingleResourceTransactionManager::new(
        Arc::new(BackendFactory::in_memory()),
        TransactionConfig::default(),
    )
}
