//! In-memory store backends.
//!
//! Used as the default fast tier and throughout the test suite. All three
//! are safe for concurrent use; atomicity comes from holding the map lock
//! across the whole check-and-set.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::context::LeadContext;
use crate::error::StoreError;
use crate::store::traits::{DedupeStore, DurableStore, TransientStore};

/// TTL-bearing map of sender id to cached context.
#[derive(Default)]
pub struct InMemoryTransient {
    entries: Mutex<HashMap<String, (LeadContext, Instant)>>,
}

impl InMemoryTransient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransientStore for InMemoryTransient {
    async fn get(&self, sender_id: &str) -> Result<Option<LeadContext>, StoreError> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(sender_id) {
            Some((_, expires_at)) => *expires_at <= Instant::now(),
            None => return Ok(None),
        };
        if expired {
            entries.remove(sender_id);
            return Ok(None);
        }
        Ok(entries.get(sender_id).map(|(ctx, _)| ctx.clone()))
    }

    async fn put(&self, ctx: &LeadContext, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(ctx.sender_id.clone(), (ctx.clone(), Instant::now() + ttl));
        Ok(())
    }
}

/// Durable tier over a plain map. The lock spans read-check-write, giving
/// the same conditional-update semantics a real database provides.
#[derive(Default)]
pub struct InMemoryDurable {
    entries: Mutex<HashMap<String, LeadContext>>,
}

impl InMemoryDurable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurable {
    async fn fetch(&self, sender_id: &str) -> Result<Option<LeadContext>, StoreError> {
        Ok(self.entries.lock().await.get(sender_id).cloned())
    }

    async fn insert_if_absent(&self, ctx: &LeadContext) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&ctx.sender_id) {
            return Ok(false);
        }
        entries.insert(ctx.sender_id.clone(), ctx.clone());
        Ok(true)
    }

    async fn update_if_version(
        &self,
        expected_version: u64,
        ctx: &LeadContext,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        let current_matches = entries
            .get(&ctx.sender_id)
            .is_some_and(|stored| stored.version == expected_version);
        if !current_matches {
            return Ok(false);
        }
        entries.insert(ctx.sender_id.clone(), ctx.clone());
        Ok(true)
    }
}

/// Seen-message set with lazy expiry, swept on insertion.
#[derive(Default)]
pub struct InMemoryDedupe {
    seen: Mutex<HashMap<String, Instant>>,
}

impl InMemoryDedupe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupeStore for InMemoryDedupe {
    async fn insert_if_new(&self, message_id: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut seen = self.seen.lock().await;
        let now = Instant::now();
        seen.retain(|_, expires_at| *expires_at > now);
        if seen.contains_key(message_id) {
            return Ok(false);
        }
        seen.insert(message_id.to_string(), now + ttl);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::Stage;

    fn ctx(sender: &str) -> LeadContext {
        LeadContext::new(sender, Stage::Intro)
    }

    #[tokio::test]
    async fn transient_get_put_roundtrip() {
        let store = InMemoryTransient::new();
        assert!(store.get("+55").await.unwrap().is_none());
        store.put(&ctx("+55"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("+55").await.unwrap().unwrap().sender_id, "+55");
    }

    #[tokio::test]
    async fn transient_entries_expire() {
        let store = InMemoryTransient::new();
        store.put(&ctx("+55"), Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("+55").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn durable_insert_if_absent_is_idempotent() {
        let store = InMemoryDurable::new();
        assert!(store.insert_if_absent(&ctx("+55")).await.unwrap());
        assert!(!store.insert_if_absent(&ctx("+55")).await.unwrap());
        assert!(store.fetch("+55").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn durable_update_requires_matching_version() {
        let store = InMemoryDurable::new();
        let mut lead = ctx("+55");
        store.insert_if_absent(&lead).await.unwrap();

        lead.mark_mutated(); // now version 2, expected 1
        assert!(store.update_if_version(1, &lead).await.unwrap());
        assert_eq!(store.fetch("+55").await.unwrap().unwrap().version, 2);

        // Stale expected version is rejected.
        assert!(!store.update_if_version(1, &lead).await.unwrap());
        // Missing sender is a conflict, not an upsert.
        assert!(!store.update_if_version(1, &ctx("+99")).await.unwrap());
    }

    #[tokio::test]
    async fn durable_concurrent_cas_has_exactly_one_winner() {
        use futures::future::join_all;

        let store = InMemoryDurable::new();
        let lead = ctx("+55");
        store.insert_if_absent(&lead).await.unwrap();

        // Eight writers race with the same stale expected version.
        let attempts = join_all((0..8u32).map(|n| {
            let store = &store;
            let mut updated = lead.clone();
            async move {
                updated.mark_mutated();
                updated.reprompt_count = n;
                store.update_if_version(1, &updated).await.unwrap()
            }
        }))
        .await;

        let winners = attempts.iter().filter(|won| **won).count();
        assert_eq!(winners, 1);
        assert_eq!(store.fetch("+55").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn dedupe_detects_duplicates_until_expiry() {
        let store = InMemoryDedupe::new();
        assert!(store.insert_if_new("m1", Duration::from_millis(20)).await.unwrap());
        assert!(!store.insert_if_new("m1", Duration::from_millis(20)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.insert_if_new("m1", Duration::from_millis(20)).await.unwrap());
    }
}
