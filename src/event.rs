//! Inbound events and outbound intents.
//!
//! Transport adapters convert their native webhook payloads into
//! [`InboundEvent`] and render [`OutboundIntent`]s back out. The engine only
//! ever sees these two shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound ─────────────────────────────────────────────────────────

/// What the candidate actually did, as a closed tagged variant.
///
/// Free text from an intent classifier is normalized into `ListSelection`
/// before it reaches stage logic, so stages validate one shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundPayload {
    /// A reply button was tapped; carries the button id.
    ButtonTap { id: String },
    /// A row was picked from a list menu; carries the row id.
    ListSelection { id: String },
    /// Raw free text.
    FreeText { text: String },
}

impl InboundPayload {
    /// The selection id, if this payload is a button tap or list pick.
    pub fn selection_id(&self) -> Option<&str> {
        match self {
            Self::ButtonTap { id } | Self::ListSelection { id } => Some(id),
            Self::FreeText { .. } => None,
        }
    }
}

/// A single inbound event from the messaging transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Channel-native message identifier, used for deduplication.
    pub message_id: String,
    /// Stable sender identity (phone number).
    pub sender_id: String,
    /// What the candidate did.
    pub payload: InboundPayload,
    /// When the transport received the message.
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn button(message_id: &str, sender_id: &str, button_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            sender_id: sender_id.to_string(),
            payload: InboundPayload::ButtonTap {
                id: button_id.to_string(),
            },
            received_at: Utc::now(),
        }
    }

    pub fn list_pick(message_id: &str, sender_id: &str, row_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            sender_id: sender_id.to_string(),
            payload: InboundPayload::ListSelection {
                id: row_id.to_string(),
            },
            received_at: Utc::now(),
        }
    }

    pub fn text(message_id: &str, sender_id: &str, text: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            sender_id: sender_id.to_string(),
            payload: InboundPayload::FreeText {
                text: text.to_string(),
            },
            received_at: Utc::now(),
        }
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// An id/label pair rendered as a button or list row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MenuOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The renderable body of an outbound intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    /// Plain text message.
    Text { body: String },
    /// Interactive menu: a prompt plus selectable options.
    ButtonList { body: String, options: Vec<MenuOption> },
    /// Pre-approved template, filled by the transport.
    Template { name: String, params: Vec<String> },
}

/// A message the engine wants sent. Delivery is the transport's problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundIntent {
    pub recipient: String,
    pub payload: OutboundPayload,
}

impl OutboundIntent {
    pub fn text(recipient: &str, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            payload: OutboundPayload::Text { body: body.into() },
        }
    }

    pub fn menu(recipient: &str, body: impl Into<String>, options: Vec<MenuOption>) -> Self {
        Self {
            recipient: recipient.to_string(),
            payload: OutboundPayload::ButtonList {
                body: body.into(),
                options,
            },
        }
    }

    pub fn template(recipient: &str, name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            payload: OutboundPayload::Template {
                name: name.into(),
                params,
            },
        }
    }
}
