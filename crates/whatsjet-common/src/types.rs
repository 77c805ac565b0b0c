//! Common types for WhatsJet

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for vendors (tenants)
pub type VendorId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// Unique identifier for queued jobs
pub type JobId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Tenant context threaded through every storage call.
///
/// Constructed once per request (or per job) from an authenticated source;
/// repositories filter every query by `vendor_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub vendor_id: VendorId,
}

impl TenantContext {
    pub fn new(vendor_id: VendorId) -> Self {
        Self { vendor_id }
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 6] = [
        CampaignStatus::Draft,
        CampaignStatus::Scheduled,
        CampaignStatus::Running,
        CampaignStatus::Paused,
        CampaignStatus::Completed,
        CampaignStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Scheduled => "SCHEDULED",
            CampaignStatus::Running => "RUNNING",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(CampaignStatus::Draft),
            "SCHEDULED" => Ok(CampaignStatus::Scheduled),
            "RUNNING" => Ok(CampaignStatus::Running),
            "PAUSED" => Ok(CampaignStatus::Paused),
            "COMPLETED" => Ok(CampaignStatus::Completed),
            "FAILED" => Ok(CampaignStatus::Failed),
            _ => Err(crate::Error::Validation(format!(
                "Invalid campaign status: {}",
                s
            ))),
        }
    }
}

/// Campaign type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignType {
    BulkMessage,
    TemplateMessage,
    BotFlow,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::BulkMessage => "BULK_MESSAGE",
            CampaignType::TemplateMessage => "TEMPLATE_MESSAGE",
            CampaignType::BotFlow => "BOT_FLOW",
        }
    }
}

impl std::fmt::Display for CampaignType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BULK_MESSAGE" => Ok(CampaignType::BulkMessage),
            "TEMPLATE_MESSAGE" => Ok(CampaignType::TemplateMessage),
            "BOT_FLOW" => Ok(CampaignType::BotFlow),
            _ => Err(crate::Error::Validation(format!(
                "Invalid campaign type: {}",
                s
            ))),
        }
    }
}

/// Message delivery status.
///
/// Advances along PENDING -> SENT -> DELIVERED -> READ. FAILED is reachable
/// from PENDING or SENT only and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    fn rank(&self) -> u8 {
        match self {
            MessageStatus::Pending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered | MessageStatus::Failed => 2,
            MessageStatus::Read => 3,
        }
    }

    /// Whether moving from `self` to `next` is a forward step
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Failed, _) => false,
            (MessageStatus::Pending | MessageStatus::Sent, MessageStatus::Failed) => true,
            (_, MessageStatus::Failed) => false,
            _ => next.rank() > self.rank(),
        }
    }

    /// Statuses from which `next` is a forward step
    pub fn predecessors_of(next: MessageStatus) -> Vec<MessageStatus> {
        [
            MessageStatus::Pending,
            MessageStatus::Sent,
            MessageStatus::Delivered,
            MessageStatus::Read,
            MessageStatus::Failed,
        ]
        .into_iter()
        .filter(|s| s.can_advance_to(next))
        .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Read => "READ",
            MessageStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MessageStatus::Pending),
            "SENT" => Ok(MessageStatus::Sent),
            "DELIVERED" => Ok(MessageStatus::Delivered),
            "READ" => Ok(MessageStatus::Read),
            "FAILED" => Ok(MessageStatus::Failed),
            _ => Err(crate::Error::Validation(format!(
                "Invalid message status: {}",
                s
            ))),
        }
    }
}

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl std::fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageDirection::Inbound => write!(f, "INBOUND"),
            MessageDirection::Outbound => write!(f, "OUTBOUND"),
        }
    }
}

impl std::str::FromStr for MessageDirection {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INBOUND" => Ok(MessageDirection::Inbound),
            "OUTBOUND" => Ok(MessageDirection::Outbound),
            _ => Err(crate::Error::Validation(format!(
                "Invalid message direction: {}",
                s
            ))),
        }
    }
}

/// Message content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    Document,
    Audio,
    Video,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::Image => "IMAGE",
            MessageType::Document => "DOCUMENT",
            MessageType::Audio => "AUDIO",
            MessageType::Video => "VIDEO",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(MessageType::Text),
            "IMAGE" => Ok(MessageType::Image),
            "DOCUMENT" => Ok(MessageType::Document),
            "AUDIO" => Ok(MessageType::Audio),
            "VIDEO" => Ok(MessageType::Video),
            _ => Err(crate::Error::Validation(format!(
                "Invalid message type: {}",
                s
            ))),
        }
    }
}

/// Page-based pagination request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit as i64
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let limit = pagination.limit.max(1) as i64;
        Self {
            data,
            total,
            page: pagination.page,
            limit: pagination.limit,
            pages: (total + limit - 1) / limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_status_never_regresses() {
        use MessageStatus::*;
        assert!(Pending.can_advance_to(Sent));
        assert!(Sent.can_advance_to(Delivered));
        assert!(Sent.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Read));
        assert!(!Read.can_advance_to(Delivered));
        assert!(!Read.can_advance_to(Read));
        assert!(!Delivered.can_advance_to(Sent));
    }

    #[test]
    fn test_failed_only_from_pending_or_sent() {
        use MessageStatus::*;
        assert!(Pending.can_advance_to(Failed));
        assert!(Sent.can_advance_to(Failed));
        assert!(!Delivered.can_advance_to(Failed));
        assert!(!Read.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Read));
        assert_eq!(MessageStatus::predecessors_of(Failed), vec![Pending, Sent]);
    }

    #[test]
    fn test_campaign_status_parse() {
        assert_eq!(
            "running".parse::<CampaignStatus>().unwrap(),
            CampaignStatus::Running
        );
        assert!("archived".parse::<CampaignStatus>().is_err());
        assert_eq!(CampaignStatus::Paused.to_string(), "PAUSED");
    }

    #[test]
    fn test_paginated_page_count() {
        let page = Paginated::new(vec![1, 2], 101, Pagination { page: 1, limit: 50 });
        assert_eq!(page.pages, 3);
        assert_eq!(Pagination { page: 3, limit: 20 }.offset(), 40);
    }
}
