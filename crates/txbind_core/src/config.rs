//! Transaction manager configuration.

use std::time::Duration;

/// Settings for a [`SingleResourceTransactionManager`](crate::SingleResourceTransactionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Timeout applied when a definition does not carry its own (`None` = no timeout).
    pub default_timeout: Option<Duration>,

    /// Whether to roll the connection back when its commit fails.
    pub rollback_on_commit_failure: bool,

    /// Whether joining an existing read-only transaction from a read-write
    /// definition is rejected.
    pub validate_existing_transaction: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            rollback_on_commit_failure: true,
            validate_existing_transaction: false,
        }
    }
}

impl TransactionConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback timeout.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets whether a failed commit triggers a connection rollback.
    #[must_use]
    pub const fn rollback_on_commit_failure(mut self, value: bool) -> Self {
        self.rollback_on_commit_failure = value;
        self
    }

    /// Sets whether participation in an existing transaction is validated.
    #[must_use]
    pub const fn validate_existing_transaction(mut self, value: bool) -> Self {
        self.validate_existing_transaction = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TransactionConfig::default();
        assert_eq!(config.default_timeout, None);
        assert!(config.rollback_on_commit_failure);
        assert!(!config.validate_existing_transaction);
    }

    #[test]
    fn builder_pattern() {
        let config = TransactionConfig::new()
            .default_timeout(Some(Duration::from_secs(5)))
            .rollback_on_commit_failure(false)
            .validate_existing_transaction(true);

        assert_eq!(config.default_timeout, Some(Duration::from_secs(5)));
        assert!(!config.rollback_on_commit_failure);
        assert!(config.validate_existing_transaction);
    }
}
