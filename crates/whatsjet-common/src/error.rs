//! Error types for WhatsJet

use crate::types::CampaignStatus;
use thiserror::Error;

/// Main error type for WhatsJet
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot transition campaign from {current} to {requested}")]
    InvalidTransition {
        current: CampaignStatus,
        requested: CampaignStatus,
    },

    #[error("Audience resolution failed: {0}")]
    AudienceResolution(String),

    #[error("Transient send failure: {0}")]
    SendTransient(String),

    #[error("Permanent send failure: {0}")]
    SendPermanent(String),

    #[error("Provider rejected vendor credentials: {0}")]
    ProviderAuth(String),

    #[error("No message matches provider message id {0}")]
    EventOrphan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for WhatsJet
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidTransition { .. } => 409,
            Error::AudienceResolution(_) => 422,
            Error::SendTransient(_) => 500,
            Error::SendPermanent(_) => 500,
            Error::ProviderAuth(_) => 502,
            Error::EventOrphan(_) => 500,
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Queue(_) => 500,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::AudienceResolution(_) => "AUDIENCE_RESOLUTION_ERROR",
            Error::SendTransient(_) => "SEND_TRANSIENT",
            Error::SendPermanent(_) => "SEND_PERMANENT",
            Error::ProviderAuth(_) => "PROVIDER_AUTH_ERROR",
            Error::EventOrphan(_) => "EVENT_ORPHAN",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Queue(_) => "QUEUE_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the Send Worker should retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SendTransient(_) | Error::EventOrphan(_))
    }
}
