//! Dispatcher - turns undispatched recipients into send jobs

use super::VendorRateLimiter;
use crate::provider::content_of;
use crate::queue::{EnqueueOptions, JobQueue, SEND_QUEUE};
use crate::worker::SendJob;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use whatsjet_common::config::DispatchConfig;
use whatsjet_common::types::{CampaignId, CampaignStatus, MessageStatus};
use whatsjet_common::{Error, Result, TenantContext};
use whatsjet_storage::Storage;

/// How a dispatch run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every recipient has been handed to the queue
    Exhausted { enqueued: u64 },
    /// The campaign left RUNNING (or the run was stopped) before the end
    Stopped {
        status: CampaignStatus,
        enqueued: u64,
    },
}

/// Walks a campaign's recipient snapshot in order and enqueues one
/// [`SendJob`] per recipient, drawing from the vendor's token bucket
pub struct Dispatcher {
    storage: Storage,
    queue: Arc<dyn JobQueue>,
    limiter: Arc<VendorRateLimiter>,
    batch_size: i64,
}

impl Dispatcher {
    pub fn new(
        storage: Storage,
        queue: Arc<dyn JobQueue>,
        limiter: Arc<VendorRateLimiter>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            storage,
            queue,
            limiter,
            batch_size: config.batch_size.max(1),
        }
    }

    /// Dispatch the remaining recipients of a campaign.
    ///
    /// The campaign status is re-read after each token is granted and right
    /// before the enqueue; as soon as it is no longer RUNNING, or `stop` is
    /// raised, the run returns.
    pub async fn run(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        stop: &AtomicBool,
    ) -> Result<DispatchOutcome> {
        let mut enqueued = 0u64;

        loop {
            let batch = self
                .storage
                .recipients
                .next_undispatched(ctx, campaign_id, self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            for contact_id in batch {
                self.limiter.acquire(ctx.vendor_id).await;

                let campaign = self
                    .storage
                    .campaigns
                    .get(ctx, campaign_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", campaign_id)))?;

                if campaign.status != CampaignStatus::Running || stop.load(Ordering::Acquire) {
                    info!(
                        campaign_id = %campaign_id,
                        status = %campaign.status,
                        enqueued,
                        "Dispatch stopped"
                    );
                    return Ok(DispatchOutcome::Stopped {
                        status: campaign.status,
                        enqueued,
                    });
                }

                let message = self
                    .storage
                    .messages
                    .get_or_create_for_campaign(
                        ctx,
                        campaign_id,
                        contact_id,
                        content_of(&campaign.message),
                    )
                    .await?;

                if message.status == MessageStatus::Pending {
                    let job = SendJob {
                        vendor_id: ctx.vendor_id,
                        campaign_id,
                        contact_id,
                        message_id: message.id,
                        payload: campaign.message.clone(),
                        attempt: 0,
                    };
                    let payload = serde_json::to_value(&job)
                        .map_err(|e| Error::Queue(format!("Failed to encode send job: {}", e)))?;
                    self.queue
                        .enqueue(SEND_QUEUE, payload, EnqueueOptions::default())
                        .await?;
                    enqueued += 1;
                } else {
                    debug!(
                        campaign_id = %campaign_id,
                        contact_id = %contact_id,
                        status = %message.status,
                        "Recipient already handled, skipping"
                    );
                }

                self.storage
                    .recipients
                    .mark_dispatched(ctx, campaign_id, contact_id)
                    .await?;
            }
        }

        info!(campaign_id = %campaign_id, enqueued, "Dispatch finished");
        Ok(DispatchOutcome::Exhausted { enqueued })
    }
}
