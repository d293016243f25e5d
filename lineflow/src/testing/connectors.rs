//! Connector doubles for connection-path tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::store::{
    ConnectionConfig, InMemoryConnector, MetadataStore, StoreConnector, StoreError,
};

/// A connector that fails transiently a fixed number of times before
/// delegating to an in-memory connector.
///
/// Models the first-time-initialization race a shared store exhibits
/// when several processes connect at once.
#[derive(Debug)]
pub struct FlakyConnector {
    inner: InMemoryConnector,
    remaining_failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyConnector {
    /// Creates a connector that fails the first `failures` open calls.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryConnector::new(),
            remaining_failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of open calls observed so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for FlakyConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn MetadataStore>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable(
                "concurrent initialization DDL in progress".to_string(),
            ));
        }
        self.inner.open(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_connector_recovers() {
        let connector = FlakyConnector::new(2);
        let config = ConnectionConfig::mysql("db", 3306, "metadata", "svc", "s");
        assert!(connector.open(&config).await.is_err());
        assert!(connector.open(&config).await.is_err());
        assert!(connector.open(&config).await.is_ok());
        assert_eq!(connector.attempts(), 3);
    }
}
