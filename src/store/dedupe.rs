//! Deduplication guard for redelivered events.
//!
//! Wraps a [`DedupeStore`] with the fail-open policy: if the guard's store
//! is unreachable, the event is treated as new — duplicate processing is the
//! cheaper failure mode than dropping a legitimate first-time message, and
//! the state machine's replay idempotency makes duplicates safe.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::traits::DedupeStore;

pub struct DedupeGuard {
    store: Arc<dyn DedupeStore>,
    /// How long a message id stays remembered. Must exceed the transport's
    /// redelivery window.
    window: Duration,
    timeout: Duration,
}

impl DedupeGuard {
    pub fn new(store: Arc<dyn DedupeStore>, window: Duration, timeout: Duration) -> Self {
        Self {
            store,
            window,
            timeout,
        }
    }

    /// Atomically record a message id. Returns `true` when the event is new
    /// and should be processed, `false` when it is a recognized duplicate.
    pub async fn mark_if_new(&self, message_id: &str) -> bool {
        match self.bounded(self.store.insert_if_new(message_id, self.window)).await {
            Ok(is_new) => {
                if !is_new {
                    debug!(message_id, "Duplicate delivery discarded");
                }
                is_new
            }
            Err(e) => {
                // Fail open: never silently drop a first-time event.
                warn!(
                    message_id,
                    error = %e,
                    "Dedupe guard degraded; treating event as new"
                );
                true
            }
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "dedupe call exceeded {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::store::memory::InMemoryDedupe;

    fn guard(store: Arc<dyn DedupeStore>) -> DedupeGuard {
        DedupeGuard::new(store, Duration::from_secs(300), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn first_sighting_is_new_second_is_duplicate() {
        let guard = guard(Arc::new(InMemoryDedupe::new()));
        assert!(guard.mark_if_new("wamid.1").await);
        assert!(!guard.mark_if_new("wamid.1").await);
        assert!(guard.mark_if_new("wamid.2").await);
    }

    #[tokio::test]
    async fn broken_store_fails_open() {
        struct BrokenDedupe;

        #[async_trait]
        impl DedupeStore for BrokenDedupe {
            async fn insert_if_new(
                &self,
                _message_id: &str,
                _ttl: Duration,
            ) -> Result<bool, StoreError> {
                Err(StoreError::Unavailable("guard store down".into()))
            }
        }

        let guard = guard(Arc::new(BrokenDedupe));
        // Degraded, but the event is never dropped.
        assert!(guard.mark_if_new("wamid.1").await);
        assert!(guard.mark_if_new("wamid.1").await);
    }

    #[tokio::test]
    async fn hanging_store_fails_open_after_timeout() {
        struct HangingDedupe;

        #[async_trait]
        impl DedupeStore for HangingDedupe {
            async fn insert_if_new(
                &self,
                _message_id: &str,
                _ttl: Duration,
            ) -> Result<bool, StoreError> {
                std::future::pending().await
            }
        }

        let guard = guard(Arc::new(HangingDedupe));
        assert!(guard.mark_if_new("wamid.1").await);
    }
}
