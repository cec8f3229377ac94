//! Transaction definitions.

use std::fmt;
use std::time::Duration;

/// How a request for a transaction relates to one already bound to the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join the current transaction, or start one if there is none.
    #[default]
    Required,
    /// Join the current transaction, or run without one.
    Supports,
    /// Join the current transaction; fail if there is none.
    Mandatory,
    /// Always start a new transaction, suspending the current one.
    RequiresNew,
    /// Run without a transaction, suspending the current one.
    NotSupported,
    /// Run without a transaction; fail if one exists.
    Never,
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Required => "required",
            Self::Supports => "supports",
            Self::Mandatory => "mandatory",
            Self::RequiresNew => "requires_new",
            Self::NotSupported => "not_supported",
            Self::Never => "never",
        };
        f.write_str(name)
    }
}

/// Properties requested for a transaction.
///
/// ```rust
/// use std::time::Duration;
/// use txbind_core::{Propagation, TransactionDefinition};
///
/// let def = TransactionDefinition::of(Propagation::RequiresNew)
///     .as_read_only()
///     .with_timeout(Duration::from_secs(1))
///     .with_name("audit");
/// assert!(def.read_only);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionDefinition {
    /// Propagation behavior.
    pub propagation: Propagation,
    /// Whether the transaction only reads.
    pub read_only: bool,
    /// Timeout; `None` defers to the manager's configured default.
    pub timeout: Option<Duration>,
    /// Optional name, exposed to the thread while the transaction runs.
    pub name: Option<String>,
}

impl TransactionDefinition {
    /// `Required`, read-write, no timeout, unnamed.
    pub const DEFAULT: Self = Self {
        propagation: Propagation::Required,
        read_only: false,
        timeout: None,
        name: None,
    };

    /// Same as [`TransactionDefinition::DEFAULT`] but read-only.
    #[must_use]
    pub const fn read_only_default() -> Self {
        Self {
            propagation: Propagation::Required,
            read_only: true,
            timeout: None,
            name: None,
        }
    }

    /// A read-write definition with the given propagation.
    #[must_use]
    pub const fn of(propagation: Propagation) -> Self {
        Self {
            propagation,
            read_only: false,
            timeout: None,
            name: None,
        }
    }

    /// Sets the propagation behavior.
    #[must_use]
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Marks the definition read-only.
    #[must_use]
    pub fn as_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
