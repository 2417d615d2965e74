//! Per-event orchestration: dedupe → load context → evaluate → persist →
//! emit outbound intents.
//!
//! One logical unit of work per inbound event. Events for different senders
//! are independent; same-sender races serialize through the context store's
//! compare-and-swap, retried as a whole read-decide-write cycle. A failed
//! unit of work applies no mutation and emits nothing beyond the generic
//! retry acknowledgment — partial failure is never partially applied.

use tracing::{error, info, warn};

use crate::config::FunnelConfig;
use crate::error::{Error, StoreError};
use crate::event::{InboundEvent, OutboundIntent};
use crate::funnel::{FunnelMachine, StageAction};
use crate::store::{ContextStore, DedupeGuard};

/// How an inbound event was handled.
#[derive(Debug)]
pub enum Disposition {
    /// Recognized duplicate delivery; nothing was emitted.
    Duplicate,
    /// First inbound from an unseen sender; the opening prompt was sent.
    Greeted,
    /// Evaluated against the funnel; see the action for what happened.
    Processed(StageAction),
    /// Fatal failure; no mutation was applied and the retry-later
    /// acknowledgment was emitted. Report the event as failed upstream.
    Failed(Error),
}

/// Result of one unit of work.
#[derive(Debug)]
pub struct EventOutcome {
    pub disposition: Disposition,
    pub intents: Vec<OutboundIntent>,
}

impl EventOutcome {
    /// Whether the event should be acknowledged as successfully handled.
    pub fn is_ok(&self) -> bool {
        !matches!(self.disposition, Disposition::Failed(_))
    }
}

/// Ties the guard, the store, and the machine together.
pub struct Orchestrator {
    guard: DedupeGuard,
    store: ContextStore,
    machine: FunnelMachine,
    cas_max_retries: u32,
}

impl Orchestrator {
    pub fn new(
        guard: DedupeGuard,
        store: ContextStore,
        machine: FunnelMachine,
        config: &FunnelConfig,
    ) -> Self {
        Self {
            guard,
            store,
            machine,
            cas_max_retries: config.cas_max_retries,
        }
    }

    /// Handle one inbound event end to end.
    ///
    /// Never panics and never returns an error: fatal failures fold into
    /// [`Disposition::Failed`] with the retry acknowledgment attached, so
    /// every non-duplicate event produces at least one outbound intent.
    pub async fn handle_event(&self, event: InboundEvent) -> EventOutcome {
        if !self.guard.mark_if_new(&event.message_id).await {
            return EventOutcome {
                disposition: Disposition::Duplicate,
                intents: Vec::new(),
            };
        }

        match self.process(&event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    message_id = %event.message_id,
                    sender_id = %event.sender_id,
                    error = %e,
                    "Event processing failed"
                );
                EventOutcome {
                    disposition: Disposition::Failed(e),
                    intents: vec![self.machine.retry_ack(&event.sender_id)],
                }
            }
        }
    }

    /// The read-decide-write cycle, retried on version conflicts.
    async fn process(&self, event: &InboundEvent) -> Result<EventOutcome, Error> {
        let mut attempts = 0u32;
        loop {
            let (ctx, created) = self
                .store
                .create_if_absent(&event.sender_id, self.machine.initial_stage())
                .await?;

            if created {
                info!(sender_id = %event.sender_id, stage = %ctx.stage, "New lead");
                let intents = self.machine.first_contact(&ctx).await?;
                return Ok(EventOutcome {
                    disposition: Disposition::Greeted,
                    intents,
                });
            }

            let mut eval = self.machine.evaluate(&ctx, event).await?;

            if !eval.mutated {
                return Ok(EventOutcome {
                    disposition: Disposition::Processed(eval.action),
                    intents: eval.intents,
                });
            }

            let expected = ctx.version;
            eval.context.mark_mutated();
            match self.store.compare_and_swap(expected, &eval.context).await {
                Ok(()) => {
                    info!(
                        sender_id = %event.sender_id,
                        stage = %eval.context.stage,
                        version = eval.context.version,
                        "Context persisted"
                    );
                    return Ok(EventOutcome {
                        disposition: Disposition::Processed(eval.action),
                        intents: eval.intents,
                    });
                }
                Err(StoreError::VersionConflict { .. }) => {
                    attempts += 1;
                    if attempts > self.cas_max_retries {
                        return Err(crate::error::FunnelError::RetriesExhausted {
                            sender_id: event.sender_id.clone(),
                            attempts,
                        }
                        .into());
                    }
                    warn!(
                        sender_id = %event.sender_id,
                        attempt = attempts,
                        "Version conflict; retrying from fresh state"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
