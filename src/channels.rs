//! Outbound delivery seam.
//!
//! The engine produces [`OutboundIntent`]s; a `Sender` gets them to the
//! candidate. Delivery is best-effort — failures are logged by the caller
//! and never retried by the engine.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::event::{OutboundIntent, OutboundPayload};

/// Transport adapter for outbound intents.
#[async_trait]
pub trait Sender: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, intent: &OutboundIntent) -> Result<(), ChannelError>;
}

/// Prints intents to stdout — the local REPL transport.
pub struct CliSender;

impl CliSender {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sender for CliSender {
    fn name(&self) -> &str {
        "cli"
    }

    async fn deliver(&self, intent: &OutboundIntent) -> Result<(), ChannelError> {
        match &intent.payload {
            OutboundPayload::Text { body } => {
                println!("→ {body}");
            }
            OutboundPayload::ButtonList { body, options } => {
                println!("→ {body}");
                for option in options {
                    match &option.description {
                        Some(desc) => println!("    [{}] {} — {desc}", option.id, option.label),
                        None => println!("    [{}] {}", option.id, option.label),
                    }
                }
            }
            OutboundPayload::Template { name, params } => {
                println!("→ (template {name}: {})", params.join(", "));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MenuOption;

    #[tokio::test]
    async fn cli_sender_accepts_every_payload_kind() {
        let sender = CliSender::new();
        let intents = [
            OutboundIntent::text("+55", "hello"),
            OutboundIntent::menu("+55", "pick", vec![MenuOption::new("a", "A")]),
            OutboundIntent::template("+55", "form_handoff", vec!["tok".into()]),
        ];
        for intent in &intents {
            sender.deliver(intent).await.unwrap();
        }
        assert_eq!(sender.name(), "cli");
    }
}
