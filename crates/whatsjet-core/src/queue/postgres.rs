//! PostgreSQL job queue

use super::{EnqueueOptions, JobQueue, QueuedJob};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use whatsjet_common::types::JobId;
use whatsjet_common::{Error, Result};
use whatsjet_storage::DatabasePool;

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    queue: String,
    payload: serde_json::Value,
    attempts: i32,
}

/// Job queue backed by the `jobs` table
pub struct PgJobQueue {
    db_pool: DatabasePool,
    visibility_timeout: Duration,
}

impl PgJobQueue {
    pub fn new(db_pool: DatabasePool) -> Self {
        Self {
            db_pool,
            visibility_timeout: Duration::from_secs(120),
        }
    }

    /// Set how long a claimed job stays hidden before redelivery
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }
}

fn queue_err(e: sqlx::Error) -> Error {
    Error::Queue(e.to_string())
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        queue: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let id = Uuid::now_v7();
        let delay = options
            .delay
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(chrono::Duration::zero);
        let run_at = Utc::now() + delay;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, payload, run_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(queue)
        .bind(&payload)
        .bind(run_at)
        .execute(self.db_pool.pool())
        .await
        .map_err(queue_err)?;

        debug!(job_id = %id, queue, run_at = %run_at, "Enqueued job");
        Ok(id)
    }

    async fn pop(&self, queue: &str) -> Result<Option<QueuedJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs SET
                locked_until = NOW() + make_interval(secs => $2),
                attempts = attempts + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND run_at <= NOW()
                  AND (locked_until IS NULL OR locked_until < NOW())
                ORDER BY run_at ASC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue, payload, attempts
            "#,
        )
        .bind(queue)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(self.db_pool.pool())
        .await
        .map_err(queue_err)?;

        Ok(row.map(|r| QueuedJob {
            id: r.id,
            queue: r.queue,
            payload: r.payload,
            deliveries: r.attempts,
        }))
    }

    async fn ack(&self, job: &QueuedJob) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(job.id)
            .execute(self.db_pool.pool())
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    async fn len(&self, queue: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = $1")
            .bind(queue)
            .fetch_one(self.db_pool.pool())
            .await
            .map_err(queue_err)
    }
}
