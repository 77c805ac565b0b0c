//! Shared fixtures for pipeline tests

use crate::campaign::CampaignManager;
use crate::dispatch::{Dispatcher, VendorRateLimiter};
use crate::inbound::InboundProcessor;
use crate::metrics::Metrics;
use crate::provider::{MessagingProvider, OutboundMessage, ProviderError, SendReceipt};
use crate::queue::MemoryQueue;
use crate::worker::SendWorker;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use whatsjet_common::types::{CampaignId, CampaignType};
use whatsjet_common::{Config, TenantContext};
use whatsjet_storage::models::{
    AudienceDescriptor, Campaign, Contact, CreateCampaign, CreateContact, CreateVendor,
    MessagePayload, ScheduleDescriptor, VendorCredentials,
};
use whatsjet_storage::Storage;

/// Provider double: succeeds by default, with global and per-recipient
/// failures
#[derive(Default)]
pub struct FakeProvider {
    by_recipient: Mutex<HashMap<String, ProviderError>>,
    always: Mutex<Option<ProviderError>>,
    calls: Mutex<Vec<(String, Instant)>>,
    next_id: AtomicU64,
}

impl FakeProvider {
    pub fn fail_recipient(&self, phone: &str, error: ProviderError) {
        self.by_recipient
            .lock()
            .unwrap()
            .insert(phone.to_string(), error);
    }

    pub fn fail_always(&self, error: ProviderError) {
        *self.always.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.always.lock().unwrap() = None;
        self.by_recipient.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingProvider for FakeProvider {
    async fn send(
        &self,
        _credentials: &VendorCredentials,
        to: &str,
        _message: &OutboundMessage,
    ) -> Result<SendReceipt, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((to.to_string(), Instant::now()));

        if let Some(error) = self.always.lock().unwrap().clone() {
            return Err(error);
        }
        if let Some(error) = self.by_recipient.lock().unwrap().get(to).cloned() {
            return Err(error);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            provider_message_id: format!("wamid.TEST{}", n),
        })
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.dispatch.rate_per_second = 1_000;
    config.dispatch.burst = 1_000;
    config.dispatch.batch_size = 3;
    config.worker.retry_base_ms = 100;
    config.worker.retry_max_ms = 10_000;
    config.worker.retry_jitter_ms = 0;
    config.inbound.orphan_retry_attempts = 5;
    config.inbound.orphan_retry_delay_ms = 50;
    config
}

pub struct Harness {
    pub storage: Storage,
    pub queue: Arc<MemoryQueue>,
    pub metrics: Arc<Metrics>,
    pub provider: Arc<FakeProvider>,
    pub manager: Arc<CampaignManager>,
    pub worker: Arc<SendWorker>,
    pub processor: InboundProcessor,
    pub ctx: TenantContext,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(&test_config()).await
    }

    pub async fn with_config(config: &Config) -> Self {
        let storage = Storage::in_memory();
        let queue = Arc::new(MemoryQueue::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let provider = Arc::new(FakeProvider::default());

        let limiter = Arc::new(VendorRateLimiter::new(&config.dispatch));
        let dispatcher = Arc::new(Dispatcher::new(
            storage.clone(),
            queue.clone(),
            limiter,
            &config.dispatch,
        ));
        let manager = Arc::new(CampaignManager::new(
            storage.clone(),
            dispatcher,
            metrics.clone(),
        ));
        let worker = Arc::new(
            SendWorker::new(
                storage.clone(),
                queue.clone(),
                provider.clone(),
                manager.clone(),
                metrics.clone(),
                &config.worker,
            )
            .unwrap(),
        );
        let processor = InboundProcessor::new(
            storage.clone(),
            manager.clone(),
            metrics.clone(),
            &config.inbound,
        );

        let vendor = storage
            .vendors
            .create(CreateVendor {
                name: "Acme Retail".to_string(),
                credentials: Some(VendorCredentials {
                    access_token: "token".to_string(),
                    phone_number_id: "1055".to_string(),
                    waba_id: "waba-1".to_string(),
                }),
                webhook_verify_token: Some("verify-me".to_string()),
            })
            .await
            .unwrap();

        Self {
            storage,
            queue,
            metrics,
            provider,
            manager,
            worker,
            processor,
            ctx: TenantContext::new(vendor.id),
        }
    }

    pub async fn add_contact(&self, phone: &str, tags: &[&str]) -> Contact {
        self.storage
            .contacts
            .create(
                &self.ctx,
                CreateContact {
                    phone_number: phone.to_string(),
                    first_name: format!("Contact {}", phone),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    pub async fn add_contacts(&self, count: usize) -> Vec<Contact> {
        let mut contacts = Vec::with_capacity(count);
        for i in 0..count {
            contacts.push(self.add_contact(&format!("+1555010{:04}", i), &[]).await);
        }
        contacts
    }

    pub fn campaign_input(&self, schedule: ScheduleDescriptor) -> CreateCampaign {
        CreateCampaign {
            name: "Summer launch".to_string(),
            description: Some("Announce the summer range".to_string()),
            campaign_type: CampaignType::BulkMessage,
            audience: AudienceDescriptor::AllContacts,
            message: MessagePayload::Text {
                body: "Hi {{first_name}}, our summer range is live".to_string(),
                media: None,
            },
            schedule,
            parent_campaign_id: None,
        }
    }

    pub async fn create_campaign(&self) -> Campaign {
        self.manager
            .create_campaign(&self.ctx, self.campaign_input(ScheduleDescriptor::Immediate))
            .await
            .unwrap()
    }

    pub async fn campaign(&self, id: CampaignId) -> Campaign {
        self.manager.get_campaign(&self.ctx, id).await.unwrap()
    }

    /// Let dispatch finish, then work the queue until nothing is eligible
    pub async fn run_to_idle(&self, id: CampaignId) {
        self.manager.wait_for_dispatch(id).await;
        while self.worker.process_next().await.unwrap() {}
    }
}
