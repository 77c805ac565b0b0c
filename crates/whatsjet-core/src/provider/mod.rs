//! Messaging provider collaborator

mod graph;
mod render;

pub use graph::{classify_failure, format_phone_number, GraphApiProvider};
pub use render::{content_of, TemplateRenderer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use whatsjet_common::types::MessageType;
use whatsjet_storage::models::{MediaAttachment, VendorCredentials};

/// A payload rendered for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        body: String,
    },
    Media {
        media_type: MessageType,
        link: String,
        caption: Option<String>,
        filename: Option<String>,
    },
    Template {
        name: String,
        language: String,
        parameters: Vec<String>,
        header_media: Option<MediaAttachment>,
    },
    Flow {
        flow_id: String,
        body: String,
    },
}

/// Provider acceptance of a send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: String,
}

/// Classified provider failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeout, 5xx or throttling; worth retrying
    #[error("{0}")]
    Transient(String),

    /// Rejected for this recipient or payload; retrying cannot help
    #[error("{0}")]
    Permanent(String),

    /// The vendor's credentials were rejected
    #[error("{0}")]
    Auth(String),
}

impl From<ProviderError> for whatsjet_common::Error {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Transient(m) => whatsjet_common::Error::SendTransient(m),
            ProviderError::Permanent(m) => whatsjet_common::Error::SendPermanent(m),
            ProviderError::Auth(m) => whatsjet_common::Error::ProviderAuth(m),
        }
    }
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send(
        &self,
        credentials: &VendorCredentials,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, ProviderError>;
}
