//! Backend-agnostic store traits.
//!
//! The context store layers a TTL-bearing fast tier over an authoritative
//! durable tier; the dedupe guard sits on its own short-TTL set. Backends
//! implement these and nothing else.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::LeadContext;
use crate::error::StoreError;

/// Fast, transient tier. Entries may vanish at any time; losing one only
/// degrades the next read to a durable fetch.
#[async_trait]
pub trait TransientStore: Send + Sync {
    /// Cached context for a sender, if present and not expired.
    async fn get(&self, sender_id: &str) -> Result<Option<LeadContext>, StoreError>;

    /// Cache a context copy with the given TTL, replacing any existing copy.
    async fn put(&self, ctx: &LeadContext, ttl: Duration) -> Result<(), StoreError>;
}

/// Authoritative tier. All writes are conditional on the stored version,
/// which is what serializes concurrent mutations of the same lead.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Load the stored context for a sender.
    async fn fetch(&self, sender_id: &str) -> Result<Option<LeadContext>, StoreError>;

    /// Insert a fresh context unless one already exists.
    /// Returns `false` when a concurrent creator won the race.
    async fn insert_if_absent(&self, ctx: &LeadContext) -> Result<bool, StoreError>;

    /// Replace the stored context only if its version equals
    /// `expected_version`. Returns `false` on a stale write.
    async fn update_if_version(
        &self,
        expected_version: u64,
        ctx: &LeadContext,
    ) -> Result<bool, StoreError>;
}

/// Short-TTL seen-message set. Insertion must be an atomic check-and-set.
#[async_trait]
pub trait DedupeStore: Send + Sync {
    /// Record `message_id` unless already present and unexpired.
    /// Returns `true` when this call inserted it (first sighting).
    async fn insert_if_new(&self, message_id: &str, ttl: Duration) -> Result<bool, StoreError>;
}
