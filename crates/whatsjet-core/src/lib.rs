//! WhatsJet Core - Campaign delivery pipeline
//!
//! This crate provides the campaign state machine, audience resolution,
//! rate-limited dispatch, the send worker with retry, inbound webhook event
//! processing and the campaign scheduler.

pub mod audience;
pub mod campaign;
pub mod dispatch;
pub mod inbound;
pub mod metrics;
pub mod provider;
pub mod queue;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use audience::AudienceResolver;
pub use campaign::CampaignManager;
pub use dispatch::{Dispatcher, VendorRateLimiter};
pub use inbound::{EventKind, InboundEvent, InboundProcessor};
pub use metrics::Metrics;
pub use provider::{GraphApiProvider, MessagingProvider};
pub use queue::{JobQueue, MemoryQueue, PgJobQueue};
pub use scheduler::Scheduler;
pub use worker::{SendJob, SendWorker};
