//! In-process job queue

use super::{EnqueueOptions, JobQueue, QueuedJob};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;
use whatsjet_common::types::JobId;
use whatsjet_common::Result;

#[derive(Debug)]
struct Entry {
    job: QueuedJob,
    run_at: Instant,
}

#[derive(Default)]
struct Queues {
    ready: HashMap<String, VecDeque<Entry>>,
    in_flight: HashMap<JobId, QueuedJob>,
}

/// FIFO queue held in memory; jobs do not survive a restart
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Queues>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a claimed job back as if its visibility timeout had lapsed
    pub async fn redeliver(&self, job: &QueuedJob) {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.in_flight.remove(&job.id) {
            inner
                .ready
                .entry(job.queue.clone())
                .or_default()
                .push_front(Entry {
                    job,
                    run_at: Instant::now(),
                });
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(
        &self,
        queue: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let id = Uuid::now_v7();
        let run_at = Instant::now() + options.delay.unwrap_or_default();
        let mut inner = self.inner.lock().await;
        inner.ready.entry(queue.to_string()).or_default().push_back(Entry {
            job: QueuedJob {
                id,
                queue: queue.to_string(),
                payload,
                deliveries: 0,
            },
            run_at,
        });
        Ok(id)
    }

    async fn pop(&self, queue: &str) -> Result<Option<QueuedJob>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let Some(entries) = inner.ready.get_mut(queue) else {
            return Ok(None);
        };
        let Some(pos) = entries.iter().position(|e| e.run_at <= now) else {
            return Ok(None);
        };
        let Some(mut entry) = entries.remove(pos) else {
            return Ok(None);
        };

        entry.job.deliveries += 1;
        let job = entry.job;
        inner.in_flight.insert(job.id, job.clone());
        Ok(Some(job))
    }

    async fn ack(&self, job: &QueuedJob) -> Result<()> {
        self.inner.lock().await.in_flight.remove(&job.id);
        Ok(())
    }

    async fn len(&self, queue: &str) -> Result<i64> {
        let inner = self.inner.lock().await;
        let waiting = inner.ready.get(queue).map(|q| q.len()).unwrap_or(0);
        let claimed = inner.in_flight.values().filter(|j| j.queue == queue).count();
        Ok((waiting + claimed) as i64)
    }
}
