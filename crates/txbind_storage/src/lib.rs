//! # txbind storage
//!
//! Byte-store backends that serve as the native resource behind a
//! single-resource transaction manager.
//!
//! A backend is an **append-only byte store**. It knows nothing about
//! transactions: the connection layer in `txbind_core` buffers a
//! transaction's writes and hands them to the backend in one `append`
//! at commit time.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral resources
//! - [`FileBackend`] - For persistent resources using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use txbind_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"ledger entry").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"ledger");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
