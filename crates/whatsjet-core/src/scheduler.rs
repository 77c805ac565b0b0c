//! Scheduler - fires due campaigns and rolls recurring ones forward

use crate::campaign::CampaignManager;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use whatsjet_common::config::SchedulerConfig;
use whatsjet_common::types::CampaignStatus;
use whatsjet_common::{Result, TenantContext};
use whatsjet_storage::models::{Campaign, CreateCampaign, ScheduleDescriptor};
use whatsjet_storage::Storage;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub started: usize,
    pub instances_created: usize,
}

pub struct Scheduler {
    storage: Storage,
    manager: Arc<CampaignManager>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(storage: Storage, manager: Arc<CampaignManager>, config: &SchedulerConfig) -> Self {
        Self {
            storage,
            manager,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        }
    }

    /// Run the scheduler loop
    pub async fn run(&self) {
        let mut ticker = interval(self.poll_interval);

        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Campaign scheduler started"
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.tick(Utc::now()).await {
                error!(error = %e, "Scheduler tick failed");
            }
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let mut summary = TickSummary::default();

        for campaign in self.storage.campaigns.list_due_scheduled(now).await? {
            let ctx = TenantContext::new(campaign.vendor_id);
            match self
                .manager
                .transition_status(&ctx, campaign.id, CampaignStatus::Running)
                .await
            {
                Ok(_) => summary.started += 1,
                Err(e) => error!(
                    campaign_id = %campaign.id,
                    error = %e,
                    "Failed to start scheduled campaign"
                ),
            }
        }

        for campaign in self
            .storage
            .campaigns
            .list_recurring_completed_without_successor()
            .await?
        {
            match self.spawn_next_instance(&campaign).await {
                Ok(true) => summary.instances_created += 1,
                Ok(false) => {}
                Err(e) => error!(
                    campaign_id = %campaign.id,
                    error = %e,
                    "Failed to schedule next recurring instance"
                ),
            }
        }

        if summary != TickSummary::default() {
            debug!(
                started = summary.started,
                instances_created = summary.instances_created,
                "Scheduler tick"
            );
        }
        Ok(summary)
    }

    /// Clone a completed recurring campaign into its next SCHEDULED run.
    /// Returns false when another scheduler already linked a successor.
    async fn spawn_next_instance(&self, campaign: &Campaign) -> Result<bool> {
        if !matches!(campaign.schedule, ScheduleDescriptor::Recurring { .. }) {
            return Ok(false);
        }
        let ctx = TenantContext::new(campaign.vendor_id);

        let next = self
            .manager
            .create_campaign(
                &ctx,
                CreateCampaign {
                    name: campaign.name.clone(),
                    description: campaign.description.clone(),
                    campaign_type: campaign.campaign_type,
                    audience: campaign.audience.clone(),
                    message: campaign.message.clone(),
                    schedule: campaign.schedule.clone(),
                    parent_campaign_id: Some(campaign.id),
                },
            )
            .await?;

        // Schedule before linking so a linked successor is never a DRAFT.
        let scheduled = match self
            .manager
            .transition_status(&ctx, next.id, CampaignStatus::Scheduled)
            .await
        {
            Ok(scheduled) => scheduled,
            Err(e) => {
                self.discard(&ctx, &next).await;
                return Err(e);
            }
        };

        match self
            .storage
            .campaigns
            .set_next_instance(&ctx, campaign.id, next.id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(campaign_id = %campaign.id, "Successor already linked, discarding duplicate");
                self.discard(&ctx, &scheduled).await;
                return Ok(false);
            }
            Err(e) => {
                self.discard(&ctx, &scheduled).await;
                return Err(e);
            }
        }

        info!(
            campaign_id = %campaign.id,
            next_campaign_id = %scheduled.id,
            scheduled_at = ?scheduled.scheduled_at,
            "Scheduled next recurring run"
        );
        Ok(true)
    }

    /// Remove an unlinked successor; the parent stays eligible for the next tick
    async fn discard(&self, ctx: &TenantContext, successor: &Campaign) {
        if successor.status == CampaignStatus::Scheduled {
            if let Err(e) = self
                .manager
                .transition_status(ctx, successor.id, CampaignStatus::Draft)
                .await
            {
                warn!(campaign_id = %successor.id, error = %e, "Failed to unschedule successor");
                return;
            }
        }
        if let Err(e) = self.manager.delete_campaigns(ctx, &[successor.id]).await {
            warn!(campaign_id = %successor.id, error = %e, "Failed to delete successor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, Harness};
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;

    fn scheduler(h: &Harness) -> Scheduler {
        Scheduler::new(h.storage.clone(), h.manager.clone(), &test_config().scheduler)
    }

    #[tokio::test]
    async fn test_due_campaign_starts_on_tick() {
        let h = Harness::new().await;
        h.add_contacts(2).await;
        let at = Utc::now() + ChronoDuration::minutes(10);
        let campaign = h
            .manager
            .create_campaign(&h.ctx, h.campaign_input(ScheduleDescriptor::Scheduled { at }))
            .await
            .unwrap();
        h.manager
            .transition_status(&h.ctx, campaign.id, CampaignStatus::Scheduled)
            .await
            .unwrap();

        let scheduler = scheduler(&h);
        let early = scheduler.tick(at - ChronoDuration::seconds(1)).await.unwrap();
        assert_eq!(early, TickSummary::default());

        let due = scheduler.tick(at).await.unwrap();
        assert_eq!(due.started, 1);
        h.run_to_idle(campaign.id).await;

        let done = h.campaign(campaign.id).await;
        assert_eq!(done.status, CampaignStatus::Completed);
        assert_eq!(done.stats.sent, 2);
    }

    #[tokio::test]
    async fn test_recurring_campaign_gets_one_successor() {
        let h = Harness::new().await;
        h.add_contacts(1).await;
        let campaign = h
            .manager
            .create_campaign(
                &h.ctx,
                h.campaign_input(ScheduleDescriptor::Recurring {
                    pattern: "0 9 * * *".to_string(),
                }),
            )
            .await
            .unwrap();
        let scheduled = h
            .manager
            .transition_status(&h.ctx, campaign.id, CampaignStatus::Scheduled)
            .await
            .unwrap();
        let first_run = scheduled.scheduled_at.unwrap();

        let scheduler = scheduler(&h);
        assert_eq!(scheduler.tick(first_run).await.unwrap().started, 1);
        h.run_to_idle(campaign.id).await;
        assert_eq!(h.campaign(campaign.id).await.status, CampaignStatus::Completed);

        // Ticks at the real clock so the successor is not yet due.
        let summary = scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(summary.instances_created, 1);
        assert_eq!(scheduler.tick(Utc::now()).await.unwrap(), TickSummary::default());

        let parent = h.campaign(campaign.id).await;
        let successor = h.campaign(parent.next_instance_id.unwrap()).await;
        assert_eq!(successor.status, CampaignStatus::Scheduled);
        assert_eq!(successor.parent_campaign_id, Some(parent.id));
        assert_eq!(successor.name, parent.name);
        assert!(successor.scheduled_at.unwrap() > Utc::now());
        assert_eq!(successor.stats.total_contacts, 0);
    }

    async fn completed_recurring(h: &Harness, pattern: &str) -> Campaign {
        let campaign = h
            .manager
            .create_campaign(
                &h.ctx,
                h.campaign_input(ScheduleDescriptor::Recurring {
                    pattern: pattern.to_string(),
                }),
            )
            .await
            .unwrap();
        h.manager
            .transition_status(&h.ctx, campaign.id, CampaignStatus::Running)
            .await
            .unwrap();
        h.run_to_idle(campaign.id).await;
        let done = h.campaign(campaign.id).await;
        assert_eq!(done.status, CampaignStatus::Completed);
        done
    }

    async fn live_campaigns(h: &Harness) -> Vec<Campaign> {
        h.storage
            .campaigns
            .list(&h.ctx, &Default::default(), Default::default())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_unschedulable_successor_is_not_linked() {
        let h = Harness::new().await;
        h.add_contacts(1).await;
        // Parses, but its only occurrence is in the past.
        let parent = completed_recurring(&h, "0 0 9 1 1 * 2020").await;

        let scheduler = scheduler(&h);
        assert_eq!(scheduler.tick(Utc::now()).await.unwrap(), TickSummary::default());

        assert!(h.campaign(parent.id).await.next_instance_id.is_none());
        let live = live_campaigns(&h).await;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, parent.id);
    }

    #[tokio::test]
    async fn test_losing_link_race_discards_successor() {
        let h = Harness::new().await;
        h.add_contacts(1).await;
        let parent = completed_recurring(&h, "0 9 * * *").await;

        let winner = h.create_campaign().await;
        assert!(h
            .storage
            .campaigns
            .set_next_instance(&h.ctx, parent.id, winner.id)
            .await
            .unwrap());

        let scheduler = scheduler(&h);
        assert!(!scheduler.spawn_next_instance(&parent).await.unwrap());

        assert_eq!(h.campaign(parent.id).await.next_instance_id, Some(winner.id));
        let live = live_campaigns(&h).await;
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|c| c.status != CampaignStatus::Scheduled));
    }
}
