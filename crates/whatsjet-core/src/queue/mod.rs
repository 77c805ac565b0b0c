//! Durable job queue collaborator
//!
//! At-least-once delivery: a popped job is hidden until acknowledged or until
//! its visibility timeout lapses, after which it is handed out again.

mod memory;
mod postgres;

pub use memory::MemoryQueue;
pub use postgres::PgJobQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use whatsjet_common::types::JobId;
use whatsjet_common::Result;

/// Queue carrying outbound send jobs
pub const SEND_QUEUE: &str = "messages";

/// Options for [`JobQueue::enqueue`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Hold the job back for this long before it becomes eligible
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

/// A job claimed from a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub queue: String,
    pub payload: serde_json::Value,
    /// Times this job has been handed out, including this one
    pub deliveries: i32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        queue: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId>;

    /// Claim the oldest eligible job, if any
    async fn pop(&self, queue: &str) -> Result<Option<QueuedJob>>;

    /// Remove a finished job
    async fn ack(&self, job: &QueuedJob) -> Result<()>;

    /// Jobs waiting or in flight on `queue`
    async fn len(&self, queue: &str) -> Result<i64>;
}
