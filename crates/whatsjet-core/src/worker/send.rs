//! Send worker pool

use super::{RetryPolicy, SendJob};
use crate::campaign::CampaignManager;
use crate::metrics::Metrics;
use crate::provider::{MessagingProvider, ProviderError, TemplateRenderer};
use crate::queue::{EnqueueOptions, JobQueue, QueuedJob, SEND_QUEUE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use whatsjet_common::config::WorkerConfig;
use whatsjet_common::types::{CampaignStatus, MessageStatus};
use whatsjet_common::{Error, Result, TenantContext};
use whatsjet_storage::models::CounterDelta;
use whatsjet_storage::repository::AdvanceDetail;
use whatsjet_storage::Storage;

/// What happened to one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Accepted by the provider
    Sent { provider_message_id: String },
    /// Transient failure, re-enqueued for another attempt
    Retrying { attempt: u32, delay: Duration },
    /// Terminal failure for this recipient
    Failed { error: String },
    /// Vendor credentials rejected; the campaign was failed
    CampaignFailed { reason: String },
    /// Campaign is FAILED; the recipient was returned for a later retry
    Returned,
    /// Nothing to do (already handled or no longer exists)
    Skipped,
}

/// Send worker
pub struct SendWorker {
    storage: Storage,
    queue: Arc<dyn JobQueue>,
    provider: Arc<dyn MessagingProvider>,
    renderer: TemplateRenderer,
    manager: Arc<CampaignManager>,
    metrics: Arc<Metrics>,
    policy: RetryPolicy,
    concurrency: usize,
    poll_interval: Duration,
}

impl SendWorker {
    pub fn new(
        storage: Storage,
        queue: Arc<dyn JobQueue>,
        provider: Arc<dyn MessagingProvider>,
        manager: Arc<CampaignManager>,
        metrics: Arc<Metrics>,
        config: &WorkerConfig,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            queue,
            provider,
            renderer: TemplateRenderer::new()?,
            manager,
            metrics,
            policy: RetryPolicy::from_config(config),
            concurrency: config.concurrency.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        })
    }

    /// Run the worker pool until the task is dropped
    pub async fn run(self: Arc<Self>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        info!(
            concurrency = self.concurrency,
            max_retries = self.policy.max_retries,
            "Send worker started"
        );

        loop {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let job = match self.queue.pop(SEND_QUEUE).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Failed to pop send job");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            let worker = self.clone();
            tokio::spawn(async move {
                worker.process_job(job).await;
                drop(permit);
            });
        }
    }

    /// Pop and process one job inline. Returns false when the queue had
    /// nothing eligible.
    pub async fn process_next(&self) -> Result<bool> {
        match self.queue.pop(SEND_QUEUE).await? {
            Some(job) => {
                self.process_job(job).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Process a claimed job and acknowledge it unless handling hit an
    /// infrastructure error, in which case the queue redelivers it
    async fn process_job(&self, job: QueuedJob) {
        let send_job: SendJob = match serde_json::from_value(job.payload.clone()) {
            Ok(j) => j,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Dropping malformed send job");
                self.ack(&job).await;
                return;
            }
        };

        match self.handle(&send_job).await {
            Ok(outcome) => {
                debug!(
                    job_id = %job.id,
                    campaign_id = %send_job.campaign_id,
                    contact_id = %send_job.contact_id,
                    attempt = send_job.attempt,
                    outcome = ?outcome,
                    "Send job finished"
                );
                self.ack(&job).await;
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    campaign_id = %send_job.campaign_id,
                    contact_id = %send_job.contact_id,
                    attempt = send_job.attempt,
                    error = %e,
                    "Send job errored; leaving it for redelivery"
                );
            }
        }
    }

    async fn ack(&self, job: &QueuedJob) {
        if let Err(e) = self.queue.ack(job).await {
            warn!(job_id = %job.id, error = %e, "Failed to acknowledge send job");
        }
    }

    /// Execute one send job
    pub async fn handle(&self, job: &SendJob) -> Result<JobOutcome> {
        let ctx = job.tenant();

        let Some(message) = self.storage.messages.get(&ctx, job.message_id).await? else {
            warn!(message_id = %job.message_id, "Message for send job no longer exists");
            return Ok(JobOutcome::Skipped);
        };
        if message.status != MessageStatus::Pending {
            // Redelivered after an earlier attempt already resolved it.
            return Ok(JobOutcome::Skipped);
        }

        let Some(campaign) = self.storage.campaigns.get(&ctx, job.campaign_id).await? else {
            return Ok(JobOutcome::Skipped);
        };
        if campaign.status == CampaignStatus::Failed {
            self.storage
                .recipients
                .reset_dispatched(&ctx, job.campaign_id, job.contact_id)
                .await?;
            return Ok(JobOutcome::Returned);
        }

        let contact = self
            .storage
            .contacts
            .get(&ctx, job.contact_id)
            .await?
            .filter(|c| c.is_reachable());
        let Some(contact) = contact else {
            return self
                .fail_message(&ctx, job, "Recipient opted out or was removed".to_string())
                .await;
        };

        let credentials = self
            .storage
            .vendors
            .get(ctx.vendor_id)
            .await?
            .and_then(|v| v.credentials());
        let result = match credentials {
            Some(credentials) => {
                let outbound = self.renderer.render(&job.payload, &contact);
                self.provider
                    .send(&credentials, &contact.phone_number, &outbound)
                    .await
            }
            None => Err(ProviderError::Auth(
                "Vendor has no WhatsApp credentials configured".to_string(),
            )),
        };

        match result {
            Ok(receipt) => {
                let detail = AdvanceDetail {
                    provider_message_id: Some(receipt.provider_message_id.clone()),
                    error: None,
                };
                let advanced = self
                    .storage
                    .messages
                    .advance_status(&ctx, job.message_id, MessageStatus::Sent, detail)
                    .await?;
                if advanced.is_some() {
                    self.metrics.messages_sent.inc();
                    self.manager
                        .record_outcome(
                            &ctx,
                            job.campaign_id,
                            CounterDelta {
                                sent: 1,
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                Ok(JobOutcome::Sent {
                    provider_message_id: receipt.provider_message_id,
                })
            }
            Err(ProviderError::Transient(reason)) => {
                if !self.policy.should_retry(job.attempt) {
                    error!(
                        campaign_id = %job.campaign_id,
                        contact_id = %job.contact_id,
                        attempt = job.attempt,
                        error = %reason,
                        "Retries exhausted"
                    );
                    return self
                        .fail_message(&ctx, job, format!("Retries exhausted: {}", reason))
                        .await;
                }

                let delay = self.policy.delay_for(job.attempt);
                let next = job.next_attempt();
                let payload = serde_json::to_value(&next)
                    .map_err(|e| Error::Queue(format!("Failed to encode send job: {}", e)))?;
                self.queue
                    .enqueue(SEND_QUEUE, payload, EnqueueOptions::delayed(delay))
                    .await?;
                self.metrics.send_retries.inc();

                warn!(
                    campaign_id = %job.campaign_id,
                    contact_id = %job.contact_id,
                    attempt = next.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Transient send failure, retrying"
                );
                Ok(JobOutcome::Retrying {
                    attempt: next.attempt,
                    delay,
                })
            }
            Err(ProviderError::Permanent(reason)) => {
                warn!(
                    campaign_id = %job.campaign_id,
                    contact_id = %job.contact_id,
                    attempt = job.attempt,
                    error = %reason,
                    "Permanent send failure"
                );
                self.fail_message(&ctx, job, reason).await
            }
            Err(ProviderError::Auth(reason)) => {
                error!(
                    campaign_id = %job.campaign_id,
                    contact_id = %job.contact_id,
                    attempt = job.attempt,
                    error = %reason,
                    "Provider rejected vendor credentials"
                );
                let reason = Error::ProviderAuth(reason).to_string();
                self.manager
                    .fail_campaign(&ctx, job.campaign_id, &reason)
                    .await?;
                self.storage
                    .recipients
                    .reset_dispatched(&ctx, job.campaign_id, job.contact_id)
                    .await?;
                Ok(JobOutcome::CampaignFailed { reason })
            }
        }
    }

    async fn fail_message(
        &self,
        ctx: &TenantContext,
        job: &SendJob,
        reason: String,
    ) -> Result<JobOutcome> {
        let detail = AdvanceDetail {
            provider_message_id: None,
            error: Some(reason.clone()),
        };
        let advanced = self
            .storage
            .messages
            .advance_status(ctx, job.message_id, MessageStatus::Failed, detail)
            .await?;
        if advanced.is_some() {
            self.metrics.messages_failed.inc();
            self.manager
                .record_outcome(
                    ctx,
                    job.campaign_id,
                    CounterDelta {
                        failed: 1,
                        send_failed: 1,
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(JobOutcome::Failed { error: reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, Harness};
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_back_off_then_fail() {
        let h = Harness::new().await;
        h.add_contacts(1).await;
        h.provider
            .fail_always(ProviderError::Transient("HTTP 503: upstream".to_string()));
        let campaign = h.create_campaign().await;

        h.manager
            .transition_status(&h.ctx, campaign.id, CampaignStatus::Running)
            .await
            .unwrap();
        h.manager.wait_for_dispatch(campaign.id).await;

        loop {
            while h.worker.process_next().await.unwrap() {}
            if h.queue.len(SEND_QUEUE).await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let calls = h.provider.calls();
        assert_eq!(calls.len(), 6, "one attempt plus five retries");
        let gaps: Vec<u128> = calls
            .windows(2)
            .map(|w| (w[1].1 - w[0].1).as_millis())
            .collect();
        for (i, gap) in gaps.iter().enumerate() {
            let expected = 100u128 << i;
            assert!(
                *gap >= expected && *gap <= expected + 10,
                "retry {} waited {}ms, expected ~{}ms",
                i + 1,
                gap,
                expected
            );
        }

        let messages = h
            .storage
            .messages
            .list_for_campaign(&h.ctx, campaign.id)
            .await
            .unwrap();
        assert_eq!(messages[0].status, MessageStatus::Failed);
        assert!(messages[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Retries exhausted"));

        let done = h.campaign(campaign.id).await;
        assert_eq!(done.status, CampaignStatus::Completed);
        assert_eq!(done.stats.failed, 1);
        assert_eq!(done.stats.sent, 0);
        assert_eq!(done.stats.pending, 0);
        assert_eq!(h.metrics.send_retries.get(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_completes_campaign_once() {
        let mut config = test_config();
        config.worker.concurrency = 8;
        config.worker.poll_interval_ms = 5;
        let h = Harness::with_config(&config).await;

        let contacts = h.add_contacts(50).await;
        h.provider.fail_recipient(
            &contacts[17].phone_number,
            ProviderError::Permanent("(#131026) Message undeliverable".to_string()),
        );
        let campaign = h.create_campaign().await;

        let pool = tokio::spawn(h.worker.clone().run());
        h.manager
            .transition_status(&h.ctx, campaign.id, CampaignStatus::Running)
            .await
            .unwrap();

        let done = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let current = h.campaign(campaign.id).await;
                if current.status == CampaignStatus::Completed {
                    return current;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("campaign did not complete");
        pool.abort();

        assert_eq!(done.stats.sent + done.stats.send_failed, 50);
        assert_eq!(done.stats.sent, 49);
        assert_eq!(done.stats.send_failed, 1);
        assert_eq!(done.stats.pending, 0);
        assert!(done.stats.is_consistent());
        assert_eq!(h.metrics.campaigns_completed.get(), 1);
        assert_eq!(h.provider.calls().len(), 50);
    }

    #[tokio::test]
    async fn test_redelivered_job_is_not_sent_twice() {
        let h = Harness::new().await;
        h.add_contacts(1).await;
        let campaign = h.create_campaign().await;
        h.manager
            .transition_status(&h.ctx, campaign.id, CampaignStatus::Running)
            .await
            .unwrap();
        h.manager.wait_for_dispatch(campaign.id).await;

        let job = h.queue.pop(SEND_QUEUE).await.unwrap().unwrap();
        let send_job: SendJob = serde_json::from_value(job.payload.clone()).unwrap();

        let first = h.worker.handle(&send_job).await.unwrap();
        assert!(matches!(first, JobOutcome::Sent { .. }));
        // At-least-once delivery hands the same job out again.
        let second = h.worker.handle(&send_job).await.unwrap();
        assert_eq!(second, JobOutcome::Skipped);

        assert_eq!(h.provider.calls().len(), 1);
        assert_eq!(h.campaign(campaign.id).await.stats.sent, 1);
    }

    #[tokio::test]
    async fn test_opted_out_at_send_time_fails_without_sending() {
        let h = Harness::new().await;
        let contacts = h.add_contacts(2).await;
        let campaign = h.create_campaign().await;
        h.manager
            .transition_status(&h.ctx, campaign.id, CampaignStatus::Running)
            .await
            .unwrap();
        h.manager.wait_for_dispatch(campaign.id).await;

        h.storage
            .contacts
            .set_opted_out(&h.ctx, contacts[0].id, true)
            .await
            .unwrap();
        while h.worker.process_next().await.unwrap() {}

        let done = h.campaign(campaign.id).await;
        assert_eq!(done.status, CampaignStatus::Completed);
        assert_eq!(done.stats.sent, 1);
        assert_eq!(done.stats.failed, 1);
        let calls = h.provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, contacts[1].phone_number);
    }

    #[tokio::test]
    async fn test_malformed_job_is_dropped() {
        let h = Harness::new().await;
        h.queue
            .enqueue(
                SEND_QUEUE,
                serde_json::json!({ "unexpected": true }),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        assert!(h.worker.process_next().await.unwrap());
        assert_eq!(h.queue.len(SEND_QUEUE).await.unwrap(), 0);
        assert!(h.provider.calls().is_empty());
    }
}
