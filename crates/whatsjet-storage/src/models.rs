//! Domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use whatsjet_common::types::{
    CampaignId, CampaignStatus, CampaignType, ContactId, MessageDirection, MessageId,
    MessageStatus, MessageType, VendorId,
};

// ============================================================================
// Vendors
// ============================================================================

/// Vendor (tenant) model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub waba_id: Option<String>,
    pub webhook_verify_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vendor {
    /// Credentials yielded by embedded signup, if onboarding completed
    pub fn credentials(&self) -> Option<VendorCredentials> {
        match (&self.access_token, &self.phone_number_id, &self.waba_id) {
            (Some(access_token), Some(phone_number_id), Some(waba_id)) => Some(VendorCredentials {
                access_token: access_token.clone(),
                phone_number_id: phone_number_id.clone(),
                waba_id: waba_id.clone(),
            }),
            _ => None,
        }
    }
}

/// WhatsApp Business credentials for one vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCredentials {
    pub access_token: String,
    pub phone_number_id: String,
    pub waba_id: String,
}

/// Create vendor input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVendor {
    pub name: String,
    pub credentials: Option<VendorCredentials>,
    pub webhook_verify_token: Option<String>,
}

// ============================================================================
// Contacts
// ============================================================================

/// Contact model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub vendor_id: VendorId,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub tags: Vec<String>,
    pub is_opted_out: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Whether the contact may receive campaign messages
    pub fn is_reachable(&self) -> bool {
        !self.is_opted_out && !self.is_deleted
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Create contact input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContact {
    pub phone_number: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateContact {
    /// Placeholder contact for a number that messaged the vendor first
    pub fn placeholder(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            first_name: "Unknown".to_string(),
            last_name: Some("Contact".to_string()),
            ..Default::default()
        }
    }
}

// ============================================================================
// Campaigns
// ============================================================================

/// Which contacts a campaign targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudienceDescriptor {
    AllContacts,
    ContactGroup(String),
    CustomFilter(String),
}

/// Media attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub media_type: MessageType,
    pub link: String,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

/// Campaign message payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    Text {
        body: String,
        #[serde(default)]
        media: Option<MediaAttachment>,
    },
    Template {
        name: String,
        language: String,
        #[serde(default)]
        parameters: Vec<String>,
        #[serde(default)]
        header_media: Option<MediaAttachment>,
    },
    Flow {
        flow_id: String,
        body: String,
    },
}

/// When a campaign runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleDescriptor {
    Immediate,
    Scheduled { at: DateTime<Utc> },
    Recurring { pattern: String },
}

impl ScheduleDescriptor {
    pub fn is_recurring(&self) -> bool {
        matches!(self, ScheduleDescriptor::Recurring { .. })
    }
}

/// Aggregate delivery statistics.
///
/// `pending` always equals `total_contacts - sent - send_failed`; `failed`
/// counts both send failures and post-send delivery failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_contacts: i64,
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
    pub pending: i64,
    #[serde(skip_serializing, default)]
    pub send_failed: i64,
}

impl CampaignStats {
    /// Apply a counter delta and recompute `pending`
    pub fn apply(&mut self, delta: CounterDelta) {
        self.sent += delta.sent;
        self.delivered += delta.delivered;
        self.read += delta.read;
        self.failed += delta.failed;
        self.send_failed += delta.send_failed;
        self.pending = self.total_contacts - self.sent - self.send_failed;
    }

    /// Reset for a fresh audience of `total` contacts
    pub fn reset_total(&mut self, total: i64) {
        *self = CampaignStats {
            total_contacts: total,
            pending: total,
            ..Default::default()
        };
    }

    /// Whether the aggregate invariants hold
    pub fn is_consistent(&self) -> bool {
        self.sent + self.send_failed + self.pending == self.total_contacts
            && self.delivered + (self.failed - self.send_failed) <= self.sent
            && self.pending >= 0
    }
}

/// Increments applied atomically to a campaign's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
    pub send_failed: i64,
}

impl CounterDelta {
    pub fn is_zero(&self) -> bool {
        *self == CounterDelta::default()
    }
}

/// Campaign model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub vendor_id: VendorId,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub status: CampaignStatus,
    pub audience: AudienceDescriptor,
    pub message: MessagePayload,
    pub schedule: ScheduleDescriptor,
    pub stats: CampaignStats,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub parent_campaign_id: Option<CampaignId>,
    pub next_instance_id: Option<CampaignId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Whether the audience has been resolved at least once
    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.stats.total_contacts == 0 {
            0.0
        } else {
            ((self.stats.total_contacts - self.stats.pending) as f64
                / self.stats.total_contacts as f64)
                * 100.0
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub audience: AudienceDescriptor,
    pub message: MessagePayload,
    pub schedule: ScheduleDescriptor,
    #[serde(default)]
    pub parent_campaign_id: Option<CampaignId>,
}

/// Update campaign input (drafts only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub description: Option<String>,
    pub campaign_type: Option<CampaignType>,
    pub audience: Option<AudienceDescriptor>,
    pub message: Option<MessagePayload>,
    pub schedule: Option<ScheduleDescriptor>,
}

/// Status write applied by the state machine
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub to: CampaignStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Clears `ended_at` and `failure_reason` (retry of a failed campaign)
    pub reopen: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl StatusChange {
    pub fn to(status: CampaignStatus) -> Self {
        Self {
            to: status,
            started_at: None,
            ended_at: None,
            reopen: false,
            scheduled_at: None,
            failure_reason: None,
        }
    }
}

/// Campaign listing filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignFilter {
    pub status: Option<CampaignStatus>,
    pub search: Option<String>,
}

// ============================================================================
// Messages
// ============================================================================

/// Message content, one shape per message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        id: Option<String>,
        link: Option<String>,
        mime_type: Option<String>,
        caption: Option<String>,
    },
    Document {
        id: Option<String>,
        link: Option<String>,
        filename: Option<String>,
        mime_type: Option<String>,
    },
    Audio {
        id: Option<String>,
        link: Option<String>,
        mime_type: Option<String>,
        #[serde(default)]
        voice: bool,
    },
    Video {
        id: Option<String>,
        link: Option<String>,
        mime_type: Option<String>,
        caption: Option<String>,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            MessageContent::Text { .. } => MessageType::Text,
            MessageContent::Image { .. } => MessageType::Image,
            MessageContent::Document { .. } => MessageType::Document,
            MessageContent::Audio { .. } => MessageType::Audio,
            MessageContent::Video { .. } => MessageType::Video,
        }
    }
}

/// Message model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub vendor_id: VendorId,
    pub contact_id: ContactId,
    pub campaign_id: Option<CampaignId>,
    pub direction: MessageDirection,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub contact_id: ContactId,
    pub campaign_id: Option<CampaignId>,
    pub direction: MessageDirection,
    pub content: MessageContent,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
}

/// Result of a successful status advance
#[derive(Debug, Clone)]
pub struct StatusAdvance {
    pub message: Message,
    pub previous: MessageStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audience_descriptor_wire_shape() {
        let all = serde_json::to_value(AudienceDescriptor::AllContacts).unwrap();
        assert_eq!(all, serde_json::json!({ "type": "ALL_CONTACTS" }));

        let group: AudienceDescriptor =
            serde_json::from_value(serde_json::json!({ "type": "CONTACT_GROUP", "value": "vip" }))
                .unwrap();
        assert_eq!(group, AudienceDescriptor::ContactGroup("vip".to_string()));
    }

    #[test]
    fn test_stats_apply_recomputes_pending() {
        let mut stats = CampaignStats::default();
        stats.reset_total(2);
        stats.apply(CounterDelta {
            sent: 1,
            ..Default::default()
        });
        stats.apply(CounterDelta {
            failed: 1,
            send_failed: 1,
            ..Default::default()
        });

        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        assert!(stats.is_consistent());
    }

    #[test]
    fn test_vendor_credentials_require_all_fields() {
        let mut vendor = Vendor {
            id: uuid::Uuid::new_v4(),
            name: "Acme".to_string(),
            access_token: Some("token".to_string()),
            phone_number_id: Some("123".to_string()),
            waba_id: None,
            webhook_verify_token: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(vendor.credentials().is_none());

        vendor.waba_id = Some("waba".to_string());
        assert_eq!(vendor.credentials().unwrap().phone_number_id, "123");
    }

    #[test]
    fn test_schedule_descriptor_parse() {
        let schedule: ScheduleDescriptor = serde_json::from_value(serde_json::json!({
            "type": "RECURRING",
            "pattern": "0 9 * * Mon"
        }))
        .unwrap();
        assert!(schedule.is_recurring());
    }
}
