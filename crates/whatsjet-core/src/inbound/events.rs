//! Normalised inbound events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use whatsjet_common::types::{MessageStatus, VendorId};
use whatsjet_storage::models::MessageContent;

/// One provider webhook event, already attributed to a vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub vendor_id: VendorId,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_kind", rename_all = "snake_case")]
pub enum EventKind {
    MessageReceived {
        provider_message_id: String,
        sender_phone: String,
        content: MessageContent,
    },
    Delivered {
        provider_message_id: String,
    },
    Read {
        provider_message_id: String,
    },
    Failed {
        provider_message_id: String,
        error: Option<String>,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::MessageReceived { .. } => "message_received",
            EventKind::Delivered { .. } => "delivered",
            EventKind::Read { .. } => "read",
            EventKind::Failed { .. } => "failed",
        }
    }

    pub fn provider_message_id(&self) -> &str {
        match self {
            EventKind::MessageReceived {
                provider_message_id,
                ..
            }
            | EventKind::Delivered {
                provider_message_id,
            }
            | EventKind::Read {
                provider_message_id,
            }
            | EventKind::Failed {
                provider_message_id,
                ..
            } => provider_message_id,
        }
    }

    /// Status a status event moves its message to
    pub fn target_status(&self) -> Option<MessageStatus> {
        match self {
            EventKind::MessageReceived { .. } => None,
            EventKind::Delivered { .. } => Some(MessageStatus::Delivered),
            EventKind::Read { .. } => Some(MessageStatus::Read),
            EventKind::Failed { .. } => Some(MessageStatus::Failed),
        }
    }
}

impl InboundEvent {
    /// Deduplication key: (provider message id, event kind)
    pub fn idempotency_key(&self) -> (&str, &'static str) {
        (self.kind.provider_message_id(), self.kind.name())
    }
}
