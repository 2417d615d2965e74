//! Two-tier lead context store.
//!
//! Reads hit the fast tier first and fall back to the durable tier,
//! repopulating the fast copy (hydration). Writes go to the durable tier
//! synchronously — that write is the one that can fail the request — and to
//! the fast tier best-effort: losing the fast copy only degrades the next
//! read back to the hydration path, which is self-healing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::LeadContext;
use crate::error::StoreError;
use crate::funnel::Stage;
use crate::store::traits::{DurableStore, TransientStore};

pub struct ContextStore {
    transient: Arc<dyn TransientStore>,
    durable: Arc<dyn DurableStore>,
    /// Upper bound on any single tier call; a timeout counts as unavailable.
    timeout: Duration,
    /// TTL for fast-tier copies.
    transient_ttl: Duration,
}

impl ContextStore {
    pub fn new(
        transient: Arc<dyn TransientStore>,
        durable: Arc<dyn DurableStore>,
        timeout: Duration,
        transient_ttl: Duration,
    ) -> Self {
        Self {
            transient,
            durable,
            timeout,
            transient_ttl,
        }
    }

    /// The stored context for a sender, from whichever tier answers.
    pub async fn get(&self, sender_id: &str) -> Result<Option<LeadContext>, StoreError> {
        match self.bounded(self.transient.get(sender_id)).await {
            Ok(Some(ctx)) => return Ok(Some(ctx)),
            Ok(None) => {}
            Err(e) => {
                // Fast tier down is a degraded read, not a failure.
                warn!(sender_id, error = %e, "Transient tier read failed; falling back to durable");
            }
        }

        let Some(ctx) = self.bounded(self.durable.fetch(sender_id)).await? else {
            return Ok(None);
        };
        self.hydrate(&ctx).await;
        Ok(Some(ctx))
    }

    /// Load the context for a sender, creating a fresh one at
    /// `initial_stage` if none exists. Idempotent: when a concurrent creator
    /// wins the race, the stored context is returned instead.
    ///
    /// The `bool` reports whether this call created the record.
    pub async fn create_if_absent(
        &self,
        sender_id: &str,
        initial_stage: Stage,
    ) -> Result<(LeadContext, bool), StoreError> {
        if let Some(existing) = self.get(sender_id).await? {
            return Ok((existing, false));
        }

        let fresh = LeadContext::new(sender_id, initial_stage);
        if self.bounded(self.durable.insert_if_absent(&fresh)).await? {
            debug!(sender_id, stage = %fresh.stage, "Lead context created");
            self.hydrate(&fresh).await;
            return Ok((fresh, true));
        }

        // Lost the creation race — the winner's row is authoritative.
        let stored = self
            .bounded(self.durable.fetch(sender_id))
            .await?
            .ok_or_else(|| {
                StoreError::Backend(format!("lead {sender_id} vanished after creation race"))
            })?;
        self.hydrate(&stored).await;
        Ok((stored, false))
    }

    /// Persist a mutated context, conditional on the version the mutation
    /// was computed from. `new_context.version` must already be bumped.
    pub async fn compare_and_swap(
        &self,
        expected_version: u64,
        new_context: &LeadContext,
    ) -> Result<(), StoreError> {
        let swapped = self
            .bounded(self.durable.update_if_version(expected_version, new_context))
            .await?;
        if !swapped {
            return Err(StoreError::VersionConflict {
                sender_id: new_context.sender_id.clone(),
                expected: expected_version,
            });
        }
        self.hydrate(new_context).await;
        Ok(())
    }

    /// Best-effort fast-tier write. Failures are logged and absorbed.
    async fn hydrate(&self, ctx: &LeadContext) {
        if let Err(e) = self
            .bounded(self.transient.put(ctx, self.transient_ttl))
            .await
        {
            warn!(
                sender_id = %ctx.sender_id,
                error = %e,
                "Transient tier write failed; next read will hydrate from durable"
            );
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "store call exceeded {:?}",
                self.timeout
            ))),
        }
    }
}
