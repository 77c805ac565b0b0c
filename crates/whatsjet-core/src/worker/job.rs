//! Send job payload

use serde::{Deserialize, Serialize};
use whatsjet_common::types::{CampaignId, ContactId, MessageId, VendorId};
use whatsjet_common::TenantContext;
use whatsjet_storage::models::MessagePayload;

/// One outbound send, carried on the `messages` queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendJob {
    pub vendor_id: VendorId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub message_id: MessageId,
    /// Payload snapshot taken at dispatch time
    pub payload: MessagePayload,
    /// Retries already spent; 0 on the first attempt
    #[serde(default)]
    pub attempt: u32,
}

impl SendJob {
    pub fn tenant(&self) -> TenantContext {
        TenantContext::new(self.vendor_id)
    }

    /// The same job for the next attempt
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}
