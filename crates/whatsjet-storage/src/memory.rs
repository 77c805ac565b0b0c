//! In-memory storage backend
//!
//! Implements every repository trait over a single mutex-guarded state so
//! compare-and-set and counter updates are atomic like their SQL versions.

use crate::models::{
    Campaign, CampaignFilter, CampaignStats, Contact, CounterDelta, CreateCampaign, CreateContact,
    CreateVendor, Message, MessageContent, NewMessage, StatusAdvance, StatusChange,
    UpdateCampaign, Vendor,
};
use crate::repository::{
    AdvanceDetail, CampaignRepository, ContactRepository, MessageRepository, RecipientRepository,
    VendorRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use whatsjet_common::types::{
    CampaignId, CampaignStatus, ContactId, MessageDirection, MessageId, MessageStatus,
    Pagination, VendorId,
};
use whatsjet_common::{Error, Result, TenantContext};

#[derive(Debug)]
struct RecipientEntry {
    contact_id: ContactId,
    dispatched: bool,
}

#[derive(Default)]
struct MemoryState {
    vendors: HashMap<VendorId, Vendor>,
    contacts: Vec<Contact>,
    campaigns: HashMap<CampaignId, Campaign>,
    recipients: HashMap<CampaignId, Vec<RecipientEntry>>,
    messages: Vec<Message>,
}

impl MemoryState {
    fn campaign_mut(&mut self, ctx: &TenantContext, id: CampaignId) -> Option<&mut Campaign> {
        self.campaigns
            .get_mut(&id)
            .filter(|c| c.vendor_id == ctx.vendor_id && c.deleted_at.is_none())
    }

    fn owns_campaign(&self, ctx: &TenantContext, id: CampaignId) -> bool {
        self.campaigns
            .get(&id)
            .map(|c| c.vendor_id == ctx.vendor_id)
            .unwrap_or(false)
    }
}

/// In-memory implementation of all repositories
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VendorRepository for MemoryStore {
    async fn create(&self, input: CreateVendor) -> Result<Vendor> {
        let now = Utc::now();
        let credentials = input.credentials;
        let vendor = Vendor {
            id: Uuid::now_v7(),
            name: input.name,
            access_token: credentials.as_ref().map(|c| c.access_token.clone()),
            phone_number_id: credentials.as_ref().map(|c| c.phone_number_id.clone()),
            waba_id: credentials.as_ref().map(|c| c.waba_id.clone()),
            webhook_verify_token: input.webhook_verify_token,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .vendors
            .insert(vendor.id, vendor.clone());
        Ok(vendor)
    }

    async fn get(&self, id: VendorId) -> Result<Option<Vendor>> {
        Ok(self.state.lock().await.vendors.get(&id).cloned())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn create(&self, ctx: &TenantContext, input: CreateContact) -> Result<Contact> {
        let mut state = self.state.lock().await;
        if state.contacts.iter().any(|c| {
            c.vendor_id == ctx.vendor_id && !c.is_deleted && c.phone_number == input.phone_number
        }) {
            return Err(Error::Conflict(format!(
                "Contact with phone number {} already exists",
                input.phone_number
            )));
        }

        let now = Utc::now();
        let contact = Contact {
            id: Uuid::now_v7(),
            vendor_id: ctx.vendor_id,
            phone_number: input.phone_number,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            company: input.company,
            tags: input.tags,
            is_opted_out: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        state.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn get(&self, ctx: &TenantContext, id: ContactId) -> Result<Option<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .iter()
            .find(|c| c.id == id && c.vendor_id == ctx.vendor_id)
            .cloned())
    }

    async fn find_by_phone(&self, ctx: &TenantContext, phone: &str) -> Result<Option<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .iter()
            .find(|c| c.vendor_id == ctx.vendor_id && !c.is_deleted && c.phone_number == phone)
            .cloned())
    }

    async fn find_or_create_by_phone(
        &self,
        ctx: &TenantContext,
        phone: &str,
    ) -> Result<(Contact, bool)> {
        match ContactRepository::create(self, ctx, CreateContact::placeholder(phone)).await {
            Ok(contact) => Ok((contact, true)),
            Err(Error::Conflict(_)) => self
                .find_by_phone(ctx, phone)
                .await?
                .map(|c| (c, false))
                .ok_or_else(|| Error::Internal(format!("Contact for {} vanished", phone))),
            Err(e) => Err(e),
        }
    }

    async fn list_live(&self, ctx: &TenantContext) -> Result<Vec<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.vendor_id == ctx.vendor_id && c.is_reachable())
            .cloned()
            .collect())
    }

    async fn list_live_with_tag(&self, ctx: &TenantContext, tag: &str) -> Result<Vec<Contact>> {
        Ok(self
            .list_live(ctx)
            .await?
            .into_iter()
            .filter(|c| c.has_tag(tag))
            .collect())
    }

    async fn set_opted_out(
        &self,
        ctx: &TenantContext,
        id: ContactId,
        opted_out: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(contact) = state
            .contacts
            .iter_mut()
            .find(|c| c.id == id && c.vendor_id == ctx.vendor_id)
        {
            contact.is_opted_out = opted_out;
            contact.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn soft_delete(&self, ctx: &TenantContext, id: ContactId) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(contact) = state
            .contacts
            .iter_mut()
            .find(|c| c.id == id && c.vendor_id == ctx.vendor_id)
        {
            contact.is_deleted = true;
            contact.updated_at = Utc::now();
        }
        Ok(())
    }
}

fn matches_filter(campaign: &Campaign, filter: &CampaignFilter) -> bool {
    if let Some(status) = filter.status {
        if campaign.status != status {
            return false;
        }
    }
    match filter.search.as_deref().filter(|s| !s.is_empty()) {
        Some(term) => {
            let term = term.to_lowercase();
            campaign.name.to_lowercase().contains(&term)
                || campaign
                    .description
                    .as_deref()
                    .map(|d| d.to_lowercase().contains(&term))
                    .unwrap_or(false)
        }
        None => true,
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, ctx: &TenantContext, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::now_v7(),
            vendor_id: ctx.vendor_id,
            name: input.name,
            description: input.description,
            campaign_type: input.campaign_type,
            status: CampaignStatus::Draft,
            audience: input.audience,
            message: input.message,
            schedule: input.schedule,
            stats: CampaignStats::default(),
            scheduled_at: None,
            failure_reason: None,
            parent_campaign_id: input.parent_campaign_id,
            next_instance_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            deleted_at: None,
        };
        self.state
            .lock()
            .await
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, ctx: &TenantContext, id: CampaignId) -> Result<Option<Campaign>> {
        let mut state = self.state.lock().await;
        Ok(state.campaign_mut(ctx, id).map(|c| c.clone()))
    }

    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &CampaignFilter,
        pagination: Pagination,
    ) -> Result<(Vec<Campaign>, i64)> {
        let state = self.state.lock().await;
        let mut matching: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| c.vendor_id == ctx.vendor_id && c.deleted_at.is_none())
            .filter(|c| matches_filter(c, filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_draft(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>> {
        let mut state = self.state.lock().await;
        let Some(campaign) = state
            .campaign_mut(ctx, id)
            .filter(|c| c.status == CampaignStatus::Draft)
        else {
            return Ok(None);
        };

        if let Some(name) = input.name {
            campaign.name = name;
        }
        if let Some(description) = input.description {
            campaign.description = Some(description);
        }
        if let Some(campaign_type) = input.campaign_type {
            campaign.campaign_type = campaign_type;
        }
        if let Some(audience) = input.audience {
            campaign.audience = audience;
        }
        if let Some(message) = input.message {
            campaign.message = message;
        }
        if let Some(schedule) = input.schedule {
            campaign.schedule = schedule;
        }
        campaign.updated_at = Utc::now();
        Ok(Some(campaign.clone()))
    }

    async fn compare_and_set_status(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        from: CampaignStatus,
        change: StatusChange,
    ) -> Result<Option<Campaign>> {
        let mut state = self.state.lock().await;
        let Some(campaign) = state.campaign_mut(ctx, id).filter(|c| c.status == from) else {
            return Ok(None);
        };

        campaign.status = change.to;
        if campaign.started_at.is_none() {
            campaign.started_at = change.started_at;
        }
        if change.reopen {
            campaign.ended_at = None;
            campaign.failure_reason = None;
        } else {
            if change.ended_at.is_some() {
                campaign.ended_at = change.ended_at;
            }
            if change.failure_reason.is_some() {
                campaign.failure_reason = change.failure_reason;
            }
        }
        if change.scheduled_at.is_some() {
            campaign.scheduled_at = change.scheduled_at;
        }
        campaign.updated_at = Utc::now();
        Ok(Some(campaign.clone()))
    }

    async fn set_total_contacts(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        total: i64,
    ) -> Result<Campaign> {
        let mut state = self.state.lock().await;
        let campaign = state
            .campaign_mut(ctx, id)
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", id)))?;
        campaign.stats.total_contacts = total;
        campaign.stats.apply(CounterDelta::default());
        campaign.updated_at = Utc::now();
        Ok(campaign.clone())
    }

    async fn increment_counters(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        delta: CounterDelta,
    ) -> Result<Campaign> {
        let mut state = self.state.lock().await;
        let campaign = state
            .campaigns
            .get_mut(&id)
            .filter(|c| c.vendor_id == ctx.vendor_id)
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", id)))?;
        campaign.stats.apply(delta);
        campaign.updated_at = Utc::now();
        Ok(campaign.clone())
    }

    async fn soft_delete_drafts(&self, ctx: &TenantContext, ids: &[CampaignId]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut deleted = 0;
        for id in ids {
            if let Some(campaign) = state
                .campaign_mut(ctx, *id)
                .filter(|c| c.status == CampaignStatus::Draft)
            {
                campaign.deleted_at = Some(now);
                campaign.updated_at = now;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let state = self.state.lock().await;
        let mut due: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| c.status == CampaignStatus::Scheduled && c.deleted_at.is_none())
            .filter(|c| c.scheduled_at.map(|at| at <= now).unwrap_or(false))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        Ok(due)
    }

    async fn list_running(&self) -> Result<Vec<Campaign>> {
        let state = self.state.lock().await;
        let mut running: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| c.status == CampaignStatus::Running && c.deleted_at.is_none())
            .cloned()
            .collect();
        running.sort_by_key(|c| c.started_at);
        Ok(running)
    }

    async fn list_recurring_completed_without_successor(&self) -> Result<Vec<Campaign>> {
        let state = self.state.lock().await;
        let mut done: Vec<Campaign> = state
            .campaigns
            .values()
            .filter(|c| {
                c.status == CampaignStatus::Completed
                    && c.deleted_at.is_none()
                    && c.next_instance_id.is_none()
                    && c.schedule.is_recurring()
            })
            .cloned()
            .collect();
        done.sort_by_key(|c| c.ended_at);
        Ok(done)
    }

    async fn set_next_instance(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        next_id: CampaignId,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .campaigns
            .get_mut(&id)
            .filter(|c| c.vendor_id == ctx.vendor_id && c.next_instance_id.is_none())
        {
            Some(campaign) => {
                campaign.next_instance_id = Some(next_id);
                campaign.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RecipientRepository for MemoryStore {
    async fn insert_recipients(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        if !state.owns_campaign(ctx, campaign_id) {
            return Ok(0);
        }
        let entries = state.recipients.entry(campaign_id).or_default();
        let mut inserted = 0;
        for contact_id in contact_ids {
            if entries.iter().any(|e| e.contact_id == *contact_id) {
                continue;
            }
            entries.push(RecipientEntry {
                contact_id: *contact_id,
                dispatched: false,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn next_undispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<ContactId>> {
        let state = self.state.lock().await;
        if !state.owns_campaign(ctx, campaign_id) {
            return Ok(Vec::new());
        }
        Ok(state
            .recipients
            .get(&campaign_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| !e.dispatched)
                    .take(limit.max(0) as usize)
                    .map(|e| e.contact_id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark_dispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<()> {
        set_dispatched(self, ctx, campaign_id, contact_id, true).await
    }

    async fn reset_dispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<()> {
        set_dispatched(self, ctx, campaign_id, contact_id, false).await
    }

    async fn count_undispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
    ) -> Result<i64> {
        let state = self.state.lock().await;
        if !state.owns_campaign(ctx, campaign_id) {
            return Ok(0);
        }
        Ok(state
            .recipients
            .get(&campaign_id)
            .map(|entries| entries.iter().filter(|e| !e.dispatched).count() as i64)
            .unwrap_or(0))
    }
}

async fn set_dispatched(
    store: &MemoryStore,
    ctx: &TenantContext,
    campaign_id: CampaignId,
    contact_id: ContactId,
    dispatched: bool,
) -> Result<()> {
    let mut state = store.state.lock().await;
    if !state.owns_campaign(ctx, campaign_id) {
        return Ok(());
    }
    if let Some(entry) = state
        .recipients
        .get_mut(&campaign_id)
        .and_then(|entries| entries.iter_mut().find(|e| e.contact_id == contact_id))
    {
        entry.dispatched = dispatched;
    }
    Ok(())
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, ctx: &TenantContext, input: NewMessage) -> Result<Message> {
        let mut state = self.state.lock().await;
        if let Some(provider_id) = &input.provider_message_id {
            if state.messages.iter().any(|m| {
                m.vendor_id == ctx.vendor_id
                    && m.direction == input.direction
                    && m.provider_message_id.as_ref() == Some(provider_id)
            }) {
                return Err(Error::Conflict("Message already recorded".to_string()));
            }
        }

        let now = Utc::now();
        let message = Message {
            id: Uuid::now_v7(),
            vendor_id: ctx.vendor_id,
            contact_id: input.contact_id,
            campaign_id: input.campaign_id,
            direction: input.direction,
            message_type: input.content.message_type(),
            content: input.content,
            status: input.status,
            provider_message_id: input.provider_message_id,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn get_or_create_for_campaign(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
        content: MessageContent,
    ) -> Result<Message> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.messages.iter().find(|m| {
            m.vendor_id == ctx.vendor_id
                && m.direction == MessageDirection::Outbound
                && m.campaign_id == Some(campaign_id)
                && m.contact_id == contact_id
        }) {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let message = Message {
            id: Uuid::now_v7(),
            vendor_id: ctx.vendor_id,
            contact_id,
            campaign_id: Some(campaign_id),
            direction: MessageDirection::Outbound,
            message_type: content.message_type(),
            content,
            status: MessageStatus::Pending,
            provider_message_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn get(&self, ctx: &TenantContext, id: MessageId) -> Result<Option<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .find(|m| m.id == id && m.vendor_id == ctx.vendor_id)
            .cloned())
    }

    async fn find_by_provider_id(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        find_by_provider(self, ctx, MessageDirection::Outbound, provider_message_id).await
    }

    async fn find_inbound_by_provider_id(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        find_by_provider(self, ctx, MessageDirection::Inbound, provider_message_id).await
    }

    async fn advance_status(
        &self,
        ctx: &TenantContext,
        id: MessageId,
        next: MessageStatus,
        detail: AdvanceDetail,
    ) -> Result<Option<StatusAdvance>> {
        let mut state = self.state.lock().await;
        let Some(message) = state
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.vendor_id == ctx.vendor_id)
        else {
            return Ok(None);
        };

        if !message.status.can_advance_to(next) {
            return Ok(None);
        }

        let previous = message.status;
        message.status = next;
        if detail.provider_message_id.is_some() {
            message.provider_message_id = detail.provider_message_id;
        }
        if detail.error.is_some() {
            message.error = detail.error;
        }
        message.updated_at = Utc::now();

        Ok(Some(StatusAdvance {
            message: message.clone(),
            previous,
        }))
    }

    async fn list_for_campaign(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
    ) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.vendor_id == ctx.vendor_id && m.campaign_id == Some(campaign_id))
            .cloned()
            .collect())
    }
}

async fn find_by_provider(
    store: &MemoryStore,
    ctx: &TenantContext,
    direction: MessageDirection,
    provider_message_id: &str,
) -> Result<Option<Message>> {
    let state = store.state.lock().await;
    Ok(state
        .messages
        .iter()
        .find(|m| {
            m.vendor_id == ctx.vendor_id
                && m.direction == direction
                && m.provider_message_id.as_deref() == Some(provider_message_id)
        })
        .cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudienceDescriptor, MessagePayload, ScheduleDescriptor};
    use pretty_assertions::assert_eq;
    use whatsjet_common::types::CampaignType;

    fn draft_input(name: &str) -> CreateCampaign {
        CreateCampaign {
            name: name.to_string(),
            description: None,
            campaign_type: CampaignType::BulkMessage,
            audience: AudienceDescriptor::AllContacts,
            message: MessagePayload::Text {
                body: "Hi {{first_name}}".to_string(),
                media: None,
            },
            schedule: ScheduleDescriptor::Immediate,
            parent_campaign_id: None,
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_status_rejects_stale_state() {
        let store = MemoryStore::new();
        let ctx = TenantContext::new(Uuid::new_v4());
        let campaign = CampaignRepository::create(&store, &ctx, draft_input("Launch"))
            .await
            .unwrap();

        let first = store
            .compare_and_set_status(
                &ctx,
                campaign.id,
                CampaignStatus::Draft,
                StatusChange::to(CampaignStatus::Scheduled),
            )
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .compare_and_set_status(
                &ctx,
                campaign.id,
                CampaignStatus::Draft,
                StatusChange::to(CampaignStatus::Running),
            )
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_campaigns_are_tenant_scoped() {
        let store = MemoryStore::new();
        let owner = TenantContext::new(Uuid::new_v4());
        let other = TenantContext::new(Uuid::new_v4());
        let campaign = CampaignRepository::create(&store, &owner, draft_input("Private"))
            .await
            .unwrap();

        assert!(CampaignRepository::get(&store, &other, campaign.id)
            .await
            .unwrap()
            .is_none());
        let (listed, total) = store
            .list(&other, &CampaignFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_advance_status_only_moves_forward() {
        let store = MemoryStore::new();
        let ctx = TenantContext::new(Uuid::new_v4());
        let contact = ContactRepository::create(
            &store,
            &ctx,
            CreateContact {
                phone_number: "+15550001".to_string(),
                first_name: "Ann".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let message = store
            .get_or_create_for_campaign(
                &ctx,
                Uuid::new_v4(),
                contact.id,
                MessageContent::text("hello"),
            )
            .await
            .unwrap();

        let read = store
            .advance_status(&ctx, message.id, MessageStatus::Read, AdvanceDetail::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.previous, MessageStatus::Pending);

        let late = store
            .advance_status(
                &ctx,
                message.id,
                MessageStatus::Delivered,
                AdvanceDetail::default(),
            )
            .await
            .unwrap();
        assert!(late.is_none());
    }

    #[tokio::test]
    async fn test_find_or_create_by_phone_is_idempotent() {
        let store = MemoryStore::new();
        let ctx = TenantContext::new(Uuid::new_v4());

        let (first, created) = store.find_or_create_by_phone(&ctx, "+15550002").await.unwrap();
        assert!(created);
        assert_eq!(first.full_name(), "Unknown Contact");

        let (second, created) = store.find_or_create_by_phone(&ctx, "+15550002").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_soft_delete_drafts_skips_started_campaigns() {
        let store = MemoryStore::new();
        let ctx = TenantContext::new(Uuid::new_v4());
        let draft = CampaignRepository::create(&store, &ctx, draft_input("Draft"))
            .await
            .unwrap();
        let scheduled = CampaignRepository::create(&store, &ctx, draft_input("Scheduled"))
            .await
            .unwrap();
        store
            .compare_and_set_status(
                &ctx,
                scheduled.id,
                CampaignStatus::Draft,
                StatusChange::to(CampaignStatus::Scheduled),
            )
            .await
            .unwrap();

        let deleted = store
            .soft_delete_drafts(&ctx, &[draft.id, scheduled.id])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(CampaignRepository::get(&store, &ctx, draft.id)
            .await
            .unwrap()
            .is_none());
    }
}
