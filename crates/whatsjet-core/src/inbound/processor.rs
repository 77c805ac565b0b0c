//! Applies inbound events to messages and campaign counters

use super::{EventKind, InboundEvent};
use crate::campaign::CampaignManager;
use crate::metrics::Metrics;
use crate::provider::format_phone_number;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use whatsjet_common::config::InboundConfig;
use whatsjet_common::types::{MessageDirection, MessageId, MessageStatus};
use whatsjet_common::{Error, Result, TenantContext};
use whatsjet_storage::models::{CounterDelta, Message, MessageContent, NewMessage};
use whatsjet_storage::repository::AdvanceDetail;
use whatsjet_storage::Storage;

/// Result of applying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// An inbound message was stored
    Received {
        message_id: MessageId,
        new_contact: bool,
    },
    /// The status moved forward
    Advanced {
        message_id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
    },
    /// Replay or stale event; nothing changed
    Ignored,
    /// No message carries the provider id; dropped after retries
    Orphaned,
}

/// Counter increments for a message edge `previous -> next`.
///
/// A READ that skips DELIVERED counts as delivered too. A FAILED edge from
/// PENDING is a send failure.
pub fn counter_delta(previous: MessageStatus, next: MessageStatus) -> CounterDelta {
    let mut delta = CounterDelta::default();
    match next {
        MessageStatus::Delivered => delta.delivered = 1,
        MessageStatus::Read => {
            delta.read = 1;
            if matches!(previous, MessageStatus::Pending | MessageStatus::Sent) {
                delta.delivered = 1;
            }
        }
        MessageStatus::Failed => {
            delta.failed = 1;
            if previous == MessageStatus::Pending {
                delta.send_failed = 1;
            }
        }
        MessageStatus::Pending | MessageStatus::Sent => {}
    }
    delta
}

/// Inbound event processor
pub struct InboundProcessor {
    storage: Storage,
    manager: Arc<CampaignManager>,
    metrics: Arc<Metrics>,
    orphan_retry_attempts: u32,
    orphan_retry_delay: Duration,
}

impl InboundProcessor {
    pub fn new(
        storage: Storage,
        manager: Arc<CampaignManager>,
        metrics: Arc<Metrics>,
        config: &InboundConfig,
    ) -> Self {
        Self {
            storage,
            manager,
            metrics,
            orphan_retry_attempts: config.orphan_retry_attempts.max(1),
            orphan_retry_delay: Duration::from_millis(config.orphan_retry_delay_ms),
        }
    }

    /// Apply a batch of events in order; one failing event does not stop
    /// the rest
    pub async fn process_all(&self, events: Vec<InboundEvent>) -> Vec<Result<EventOutcome>> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            let result = self.process(&event).await;
            if let Err(e) = &result {
                warn!(
                    vendor_id = %event.vendor_id,
                    event_kind = event.kind.name(),
                    provider_message_id = event.kind.provider_message_id(),
                    error = %e,
                    "Failed to process inbound event"
                );
            }
            results.push(result);
        }
        results
    }

    pub async fn process(&self, event: &InboundEvent) -> Result<EventOutcome> {
        let ctx = TenantContext::new(event.vendor_id);
        self.metrics
            .inbound_events
            .with_label_values(&[event.kind.name()])
            .inc();

        match &event.kind {
            EventKind::MessageReceived {
                provider_message_id,
                sender_phone,
                content,
            } => {
                self.receive(&ctx, provider_message_id, sender_phone, content)
                    .await
            }
            EventKind::Failed {
                provider_message_id,
                error,
            } => {
                self.advance(&ctx, provider_message_id, MessageStatus::Failed, error.clone())
                    .await
            }
            EventKind::Delivered {
                provider_message_id,
            } => {
                self.advance(&ctx, provider_message_id, MessageStatus::Delivered, None)
                    .await
            }
            EventKind::Read {
                provider_message_id,
            } => {
                self.advance(&ctx, provider_message_id, MessageStatus::Read, None)
                    .await
            }
        }
    }

    async fn receive(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
        sender_phone: &str,
        content: &MessageContent,
    ) -> Result<EventOutcome> {
        if self
            .storage
            .messages
            .find_inbound_by_provider_id(ctx, provider_message_id)
            .await?
            .is_some()
        {
            debug!(provider_message_id, "Duplicate inbound message ignored");
            return Ok(EventOutcome::Ignored);
        }

        // Stored contacts carry the same form outbound sends use
        let phone = format_phone_number(sender_phone);
        let (contact, new_contact) = self
            .storage
            .contacts
            .find_or_create_by_phone(ctx, &phone)
            .await?;
        if new_contact {
            info!(vendor_id = %ctx.vendor_id, contact_id = %contact.id, "Created contact for inbound sender");
        }

        let created = self
            .storage
            .messages
            .create(
                ctx,
                NewMessage {
                    contact_id: contact.id,
                    campaign_id: None,
                    direction: MessageDirection::Inbound,
                    content: content.clone(),
                    status: MessageStatus::Delivered,
                    provider_message_id: Some(provider_message_id.to_string()),
                },
            )
            .await;

        match created {
            Ok(message) => {
                debug!(
                    message_id = %message.id,
                    contact_id = %contact.id,
                    message_type = %message.message_type,
                    "Stored inbound message"
                );
                Ok(EventOutcome::Received {
                    message_id: message.id,
                    new_contact,
                })
            }
            // A concurrent delivery of the same event won the insert.
            Err(Error::Conflict(_)) => Ok(EventOutcome::Ignored),
            Err(e) => Err(e),
        }
    }

    /// Look the message up, retrying briefly to absorb the race with the
    /// worker's SENT write
    async fn locate(&self, ctx: &TenantContext, provider_message_id: &str) -> Result<Option<Message>> {
        for attempt in 1..=self.orphan_retry_attempts {
            if let Some(message) = self
                .storage
                .messages
                .find_by_provider_id(ctx, provider_message_id)
                .await?
            {
                return Ok(Some(message));
            }
            if attempt < self.orphan_retry_attempts {
                debug!(provider_message_id, attempt, "Message not found yet, retrying");
                tokio::time::sleep(self.orphan_retry_delay).await;
            }
        }
        Ok(None)
    }

    async fn advance(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
        next: MessageStatus,
        error: Option<String>,
    ) -> Result<EventOutcome> {
        let Some(message) = self.locate(ctx, provider_message_id).await? else {
            self.metrics.orphaned_events.inc();
            warn!(
                vendor_id = %ctx.vendor_id,
                provider_message_id,
                status = %next,
                error = %Error::EventOrphan(provider_message_id.to_string()),
                "Dropping status event"
            );
            return Ok(EventOutcome::Orphaned);
        };

        let detail = AdvanceDetail {
            provider_message_id: None,
            error,
        };
        let Some(advance) = self
            .storage
            .messages
            .advance_status(ctx, message.id, next, detail)
            .await?
        else {
            debug!(
                message_id = %message.id,
                status = %next,
                "Status event is not a forward step; ignored"
            );
            return Ok(EventOutcome::Ignored);
        };

        if let Some(campaign_id) = advance.message.campaign_id {
            let delta = counter_delta(advance.previous, next);
            self.manager.record_outcome(ctx, campaign_id, delta).await?;
        }

        debug!(
            message_id = %message.id,
            from = %advance.previous,
            to = %next,
            "Message status advanced"
        );
        Ok(EventOutcome::Advanced {
            message_id: message.id,
            from: advance.previous,
            to: next,
        })
    }
}
