//! Campaign Manager - owns campaign lifecycle, counters and dispatch tasks

use super::{check_transition, next_run_at, parse_pattern};
use crate::audience::AudienceResolver;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::metrics::Metrics;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use whatsjet_common::types::{CampaignId, CampaignStatus, CampaignType, Paginated, Pagination};
use whatsjet_common::{Error, Result, TenantContext};
use whatsjet_storage::models::{
    AudienceDescriptor, Campaign, CampaignFilter, CounterDelta, CreateCampaign, MessagePayload,
    ScheduleDescriptor, StatusChange, UpdateCampaign,
};
use whatsjet_storage::Storage;

struct DispatchTask {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Campaign Manager
pub struct CampaignManager {
    storage: Storage,
    resolver: AudienceResolver,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    dispatches: Mutex<HashMap<CampaignId, DispatchTask>>,
}

impl CampaignManager {
    pub fn new(storage: Storage, dispatcher: Arc<Dispatcher>, metrics: Arc<Metrics>) -> Self {
        Self {
            resolver: AudienceResolver::new(storage.contacts.clone()),
            storage,
            dispatcher,
            metrics,
            dispatches: Mutex::new(HashMap::new()),
        }
    }

    /// Create a campaign in DRAFT with zeroed stats
    pub async fn create_campaign(
        &self,
        ctx: &TenantContext,
        input: CreateCampaign,
    ) -> Result<Campaign> {
        validate_campaign(
            &input.name,
            input.campaign_type,
            &input.audience,
            &input.message,
            &input.schedule,
        )?;

        let campaign = self.storage.campaigns.create(ctx, input).await?;
        info!(
            vendor_id = %ctx.vendor_id,
            campaign_id = %campaign.id,
            campaign_type = %campaign.campaign_type,
            "Campaign created"
        );
        Ok(campaign)
    }

    /// Edit a campaign; only drafts can be edited
    pub async fn update_campaign(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Campaign> {
        let current = self.get_campaign(ctx, id).await?;
        if current.status != CampaignStatus::Draft {
            return Err(Error::Conflict(format!(
                "Campaign {} is {} and can no longer be edited",
                id, current.status
            )));
        }

        validate_campaign(
            input.name.as_deref().unwrap_or(&current.name),
            input.campaign_type.unwrap_or(current.campaign_type),
            input.audience.as_ref().unwrap_or(&current.audience),
            input.message.as_ref().unwrap_or(&current.message),
            input.schedule.as_ref().unwrap_or(&current.schedule),
        )?;

        self.storage
            .campaigns
            .update_draft(ctx, id, input)
            .await?
            .ok_or_else(|| {
                Error::Conflict(format!("Campaign {} left DRAFT while being edited", id))
            })
    }

    pub async fn get_campaign(&self, ctx: &TenantContext, id: CampaignId) -> Result<Campaign> {
        self.storage
            .campaigns
            .get(ctx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", id)))
    }

    pub async fn list_campaigns(
        &self,
        ctx: &TenantContext,
        filter: &CampaignFilter,
        pagination: Pagination,
    ) -> Result<Paginated<Campaign>> {
        let (campaigns, total) = self.storage.campaigns.list(ctx, filter, pagination).await?;
        Ok(Paginated::new(campaigns, total, pagination))
    }

    /// Soft-delete drafts among `ids`; returns how many were deleted
    pub async fn delete_campaigns(&self, ctx: &TenantContext, ids: &[CampaignId]) -> Result<u64> {
        let deleted = self.storage.campaigns.soft_delete_drafts(ctx, ids).await?;
        if deleted < ids.len() as u64 {
            debug!(
                vendor_id = %ctx.vendor_id,
                requested = ids.len(),
                deleted,
                "Non-draft campaigns were left untouched"
            );
        }
        Ok(deleted)
    }

    /// Move a campaign to `requested`, enforcing the transition table
    pub async fn transition_status(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        requested: CampaignStatus,
    ) -> Result<Campaign> {
        let current = self.get_campaign(ctx, id).await?;
        check_transition(current.status, requested)?;
        let from = current.status;
        let now = Utc::now();

        let updated = match requested {
            CampaignStatus::Running => match from {
                CampaignStatus::Draft | CampaignStatus::Scheduled => {
                    return self.start(ctx, current).await;
                }
                _ => {
                    let change = StatusChange {
                        reopen: from == CampaignStatus::Failed,
                        ..StatusChange::to(CampaignStatus::Running)
                    };
                    let resumed = self.swap_status(ctx, id, from, change).await?;
                    info!(
                        campaign_id = %id,
                        from = %from,
                        pending = resumed.stats.pending,
                        "Campaign resumed"
                    );
                    self.spawn_dispatch(ctx, id).await;
                    return self.maybe_complete(ctx, resumed).await;
                }
            },
            CampaignStatus::Scheduled => {
                let change = StatusChange {
                    scheduled_at: Some(next_run_at(&current.schedule, now)?),
                    ..StatusChange::to(CampaignStatus::Scheduled)
                };
                self.swap_status(ctx, id, from, change).await?
            }
            CampaignStatus::Completed | CampaignStatus::Failed => {
                if current.stats.pending > 0 {
                    return Err(Error::Conflict(format!(
                        "Campaign {} still has {} pending recipients",
                        id, current.stats.pending
                    )));
                }
                let change = StatusChange {
                    ended_at: Some(now),
                    ..StatusChange::to(requested)
                };
                let ended = self.swap_status(ctx, id, from, change).await?;
                if requested == CampaignStatus::Completed {
                    self.metrics.campaigns_completed.inc();
                }
                ended
            }
            CampaignStatus::Draft | CampaignStatus::Paused => {
                self.swap_status(ctx, id, from, StatusChange::to(requested))
                    .await?
            }
        };

        info!(campaign_id = %id, from = %from, to = %requested, "Campaign status changed");
        Ok(updated)
    }

    /// Force a RUNNING or PAUSED campaign to FAILED regardless of `pending`
    pub async fn fail_campaign(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        reason: &str,
    ) -> Result<Campaign> {
        let current = self.get_campaign(ctx, id).await?;
        match current.status {
            CampaignStatus::Failed => Ok(current),
            CampaignStatus::Running | CampaignStatus::Paused => {
                let change = StatusChange {
                    ended_at: Some(Utc::now()),
                    failure_reason: Some(reason.to_string()),
                    ..StatusChange::to(CampaignStatus::Failed)
                };
                match self
                    .storage
                    .campaigns
                    .compare_and_set_status(ctx, id, current.status, change)
                    .await?
                {
                    Some(failed) => {
                        error!(campaign_id = %id, reason, "Campaign failed");
                        Ok(failed)
                    }
                    // Lost a race; another path may have failed it already.
                    None => {
                        let latest = self.get_campaign(ctx, id).await?;
                        if latest.status == CampaignStatus::Failed {
                            Ok(latest)
                        } else {
                            Err(Error::Conflict(format!(
                                "Campaign {} changed status while failing",
                                id
                            )))
                        }
                    }
                }
            }
            other => Err(Error::InvalidTransition {
                current: other,
                requested: CampaignStatus::Failed,
            }),
        }
    }

    /// Apply a counter delta and auto-complete the campaign once nothing is
    /// pending
    pub async fn record_outcome(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        delta: CounterDelta,
    ) -> Result<Campaign> {
        if delta.is_zero() {
            return self.get_campaign(ctx, id).await;
        }
        let campaign = self.storage.campaigns.increment_counters(ctx, id, delta).await?;
        debug!(
            campaign_id = %id,
            sent = campaign.stats.sent,
            failed = campaign.stats.failed,
            pending = campaign.stats.pending,
            "Campaign counters updated"
        );
        self.maybe_complete(ctx, campaign).await
    }

    /// Restart dispatch for every RUNNING campaign after a process restart
    pub async fn resume_running(&self) -> Result<usize> {
        let running = self.storage.campaigns.list_running().await?;
        let count = running.len();
        for campaign in running {
            let ctx = TenantContext::new(campaign.vendor_id);
            self.spawn_dispatch(&ctx, campaign.id).await;
            if let Err(e) = self.maybe_complete(&ctx, campaign).await {
                warn!(vendor_id = %ctx.vendor_id, error = %e, "Completion check after resume failed");
            }
        }
        if count > 0 {
            info!(count, "Resumed dispatch for running campaigns");
        }
        Ok(count)
    }

    /// Wait for the current dispatch task of a campaign to finish
    pub async fn wait_for_dispatch(&self, id: CampaignId) {
        let task = self.dispatches.lock().await.remove(&id);
        if let Some(task) = task {
            if let Err(e) = task.handle.await {
                warn!(campaign_id = %id, error = %e, "Dispatch task ended abnormally");
            }
        }
    }

    #[cfg(test)]
    async fn tracked_dispatches(&self) -> usize {
        self.dispatches.lock().await.len()
    }

    #[cfg(test)]
    async fn dispatch_finished(&self, id: CampaignId) -> bool {
        self.dispatches
            .lock()
            .await
            .get(&id)
            .map_or(true, |task| task.handle.is_finished())
    }

    async fn start(&self, ctx: &TenantContext, current: Campaign) -> Result<Campaign> {
        let id = current.id;
        let from = current.status;

        // Resolve before any write so a bad filter leaves the status unchanged.
        let recipients = self.resolver.resolve(ctx, &current.audience).await?;

        let change = StatusChange {
            started_at: Some(Utc::now()),
            ..StatusChange::to(CampaignStatus::Running)
        };
        self.swap_status(ctx, id, from, change).await?;

        self.storage
            .recipients
            .insert_recipients(ctx, id, &recipients)
            .await?;
        let campaign = self
            .storage
            .campaigns
            .set_total_contacts(ctx, id, recipients.len() as i64)
            .await?;

        info!(
            vendor_id = %ctx.vendor_id,
            campaign_id = %id,
            total_contacts = recipients.len(),
            "Campaign started"
        );

        self.spawn_dispatch(ctx, id).await;
        self.maybe_complete(ctx, campaign).await
    }

    async fn swap_status(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        from: CampaignStatus,
        change: StatusChange,
    ) -> Result<Campaign> {
        let to = change.to;
        self.storage
            .campaigns
            .compare_and_set_status(ctx, id, from, change)
            .await?
            .ok_or_else(|| {
                Error::Conflict(format!(
                    "Campaign {} changed status concurrently; {} -> {} not applied",
                    id, from, to
                ))
            })
    }

    async fn maybe_complete(&self, ctx: &TenantContext, campaign: Campaign) -> Result<Campaign> {
        if campaign.status != CampaignStatus::Running || campaign.stats.pending > 0 {
            return Ok(campaign);
        }

        let change = StatusChange {
            ended_at: Some(Utc::now()),
            ..StatusChange::to(CampaignStatus::Completed)
        };
        match self
            .storage
            .campaigns
            .compare_and_set_status(ctx, campaign.id, CampaignStatus::Running, change)
            .await?
        {
            Some(completed) => {
                self.metrics.campaigns_completed.inc();
                info!(
                    campaign_id = %completed.id,
                    sent = completed.stats.sent,
                    failed = completed.stats.failed,
                    "Campaign completed"
                );
                Ok(completed)
            }
            None => self.get_campaign(ctx, campaign.id).await,
        }
    }

    async fn spawn_dispatch(&self, ctx: &TenantContext, id: CampaignId) {
        let mut dispatches = self.dispatches.lock().await;
        dispatches.retain(|_, task| !task.handle.is_finished());

        // At most one dispatch task per campaign.
        if let Some(previous) = dispatches.remove(&id) {
            previous.stop.store(true, Ordering::Release);
            if let Err(e) = previous.handle.await {
                warn!(campaign_id = %id, error = %e, "Previous dispatch task ended abnormally");
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let dispatcher = self.dispatcher.clone();
        let ctx = *ctx;
        let task_stop = stop.clone();
        let handle = tokio::spawn(async move {
            match dispatcher.run(&ctx, id, &task_stop).await {
                Ok(DispatchOutcome::Exhausted { enqueued }) => {
                    debug!(campaign_id = %id, enqueued, "Dispatch exhausted recipients");
                }
                Ok(DispatchOutcome::Stopped { status, enqueued }) => {
                    debug!(campaign_id = %id, status = %status, enqueued, "Dispatch stopped early");
                }
                Err(e) => {
                    error!(campaign_id = %id, error = %e, "Dispatch failed");
                }
            }
        });

        dispatches.insert(id, DispatchTask { stop, handle });
    }
}

fn validate_campaign(
    name: &str,
    campaign_type: CampaignType,
    audience: &AudienceDescriptor,
    message: &MessagePayload,
    schedule: &ScheduleDescriptor,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Campaign name is required".to_string()));
    }
    if name.chars().count() > 255 {
        return Err(Error::Validation(
            "Campaign name must be at most 255 characters".to_string(),
        ));
    }

    AudienceResolver::validate(audience)?;

    match (campaign_type, message) {
        (CampaignType::BulkMessage, MessagePayload::Text { body, media }) => {
            if body.trim().is_empty() && media.is_none() {
                return Err(Error::Validation("Message body is required".to_string()));
            }
        }
        (CampaignType::TemplateMessage, MessagePayload::Template { name, language, .. }) => {
            if name.trim().is_empty() || language.trim().is_empty() {
                return Err(Error::Validation(
                    "Template name and language are required".to_string(),
                ));
            }
        }
        (CampaignType::BotFlow, MessagePayload::Flow { flow_id, .. }) => {
            if flow_id.trim().is_empty() {
                return Err(Error::Validation("Flow id is required".to_string()));
            }
        }
        (campaign_type, _) => {
            return Err(Error::Validation(format!(
                "Message payload does not match campaign type {}",
                campaign_type
            )));
        }
    }

    if let ScheduleDescriptor::Recurring { pattern } = schedule {
        parse_pattern(pattern)?;
    }

    Ok(())
}
