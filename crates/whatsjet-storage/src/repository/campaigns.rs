//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{
    AudienceDescriptor, Campaign, CampaignFilter, CampaignStats, CounterDelta, CreateCampaign,
    MessagePayload, ScheduleDescriptor, StatusChange, UpdateCampaign,
};
use crate::repository::{db_err, decode_err};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use whatsjet_common::types::{CampaignId, CampaignStatus, Pagination};
use whatsjet_common::{Error, Result, TenantContext};

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, ctx: &TenantContext, input: CreateCampaign) -> Result<Campaign>;
    async fn get(&self, ctx: &TenantContext, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &CampaignFilter,
        pagination: Pagination,
    ) -> Result<(Vec<Campaign>, i64)>;

    /// Apply `input` if the campaign is still a draft; `None` otherwise
    async fn update_draft(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>>;

    /// Write `change` only if the stored status is still `from`
    async fn compare_and_set_status(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        from: CampaignStatus,
        change: StatusChange,
    ) -> Result<Option<Campaign>>;

    /// Fix the audience size and recompute `pending`
    async fn set_total_contacts(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        total: i64,
    ) -> Result<Campaign>;

    /// Atomically add `delta` to the counters and recompute `pending`
    async fn increment_counters(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        delta: CounterDelta,
    ) -> Result<Campaign>;

    /// Soft-delete the given drafts; non-drafts are left untouched
    async fn soft_delete_drafts(&self, ctx: &TenantContext, ids: &[CampaignId]) -> Result<u64>;

    /// SCHEDULED campaigns whose `scheduled_at` has passed, across vendors
    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;

    /// RUNNING campaigns across vendors
    async fn list_running(&self) -> Result<Vec<Campaign>>;

    /// Completed recurring campaigns that have not spawned their next run yet
    async fn list_recurring_completed_without_successor(&self) -> Result<Vec<Campaign>>;

    /// Link `next_id` as the successor; false if one is already linked
    async fn set_next_instance(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        next_id: CampaignId,
    ) -> Result<bool>;
}

#[derive(Debug, FromRow)]
struct CampaignRow {
    id: Uuid,
    vendor_id: Uuid,
    name: String,
    description: Option<String>,
    campaign_type: String,
    status: String,
    audience: Json<AudienceDescriptor>,
    message: Json<MessagePayload>,
    schedule: Json<ScheduleDescriptor>,
    total_contacts: i64,
    sent_count: i64,
    delivered_count: i64,
    read_count: i64,
    failed_count: i64,
    send_failed_count: i64,
    pending_count: i64,
    scheduled_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    parent_campaign_id: Option<Uuid>,
    next_instance_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = Error;

    fn try_from(row: CampaignRow) -> Result<Self> {
        Ok(Campaign {
            id: row.id,
            vendor_id: row.vendor_id,
            name: row.name,
            description: row.description,
            campaign_type: row
                .campaign_type
                .parse()
                .map_err(|e| decode_err("campaign", e))?,
            status: row.status.parse().map_err(|e| decode_err("campaign", e))?,
            audience: row.audience.0,
            message: row.message.0,
            schedule: row.schedule.0,
            stats: CampaignStats {
                total_contacts: row.total_contacts,
                sent: row.sent_count,
                delivered: row.delivered_count,
                read: row.read_count,
                failed: row.failed_count,
                pending: row.pending_count,
                send_failed: row.send_failed_count,
            },
            scheduled_at: row.scheduled_at,
            failure_reason: row.failure_reason,
            parent_campaign_id: row.parent_campaign_id,
            next_instance_id: row.next_instance_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn convert_all(rows: Vec<CampaignRow>) -> Result<Vec<Campaign>> {
    rows.into_iter().map(Campaign::try_from).collect()
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, ctx: &TenantContext, input: CreateCampaign) -> Result<Campaign> {
        let id = Uuid::now_v7();

        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            INSERT INTO campaigns (
                id, vendor_id, name, description, campaign_type, status,
                audience, message, schedule, parent_campaign_id
            )
            VALUES ($1, $2, $3, $4, $5, 'DRAFT', $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.campaign_type.as_str())
        .bind(Json(&input.audience))
        .bind(Json(&input.message))
        .bind(Json(&input.schedule))
        .bind(input.parent_campaign_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        row.try_into()
    }

    async fn get(&self, ctx: &TenantContext, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns WHERE id = $1 AND vendor_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Campaign::try_from)
        .transpose()
    }

    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &CampaignFilter,
        pagination: Pagination,
    ) -> Result<(Vec<Campaign>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let search = filter.search.as_deref().filter(|s| !s.is_empty());

        let rows = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT * FROM campaigns
            WHERE vendor_id = $1
              AND deleted_at IS NULL
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL
                   OR name ILIKE '%' || $3 || '%'
                   OR description ILIKE '%' || $3 || '%')
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(status)
        .bind(search)
        .bind(pagination.limit as i64)
        .bind(pagination.offset())
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM campaigns
            WHERE vendor_id = $1
              AND deleted_at IS NULL
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL
                   OR name ILIKE '%' || $3 || '%'
                   OR description ILIKE '%' || $3 || '%')
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(status)
        .bind(search)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok((convert_all(rows)?, total))
    }

    async fn update_draft(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, CampaignRow>(
            r#"
            UPDATE campaigns SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                campaign_type = COALESCE($5, campaign_type),
                audience = COALESCE($6, audience),
                message = COALESCE($7, message),
                schedule = COALESCE($8, schedule),
                updated_at = NOW()
            WHERE id = $1 AND vendor_id = $2 AND status = 'DRAFT' AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.campaign_type.map(|t| t.as_str()))
        .bind(input.audience.as_ref().map(Json))
        .bind(input.message.as_ref().map(Json))
        .bind(input.schedule.as_ref().map(Json))
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Campaign::try_from)
        .transpose()
    }

    async fn compare_and_set_status(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        from: CampaignStatus,
        change: StatusChange,
    ) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, CampaignRow>(
            r#"
            UPDATE campaigns SET
                status = $4,
                started_at = COALESCE(started_at, $5::timestamptz),
                ended_at = CASE WHEN $6 THEN NULL ELSE COALESCE($7::timestamptz, ended_at) END,
                failure_reason = CASE WHEN $6 THEN NULL ELSE COALESCE($8::text, failure_reason) END,
                scheduled_at = COALESCE($9::timestamptz, scheduled_at),
                updated_at = NOW()
            WHERE id = $1 AND vendor_id = $2 AND status = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(from.as_str())
        .bind(change.to.as_str())
        .bind(change.started_at)
        .bind(change.reopen)
        .bind(change.ended_at)
        .bind(&change.failure_reason)
        .bind(change.scheduled_at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Campaign::try_from)
        .transpose()
    }

    async fn set_total_contacts(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        total: i64,
    ) -> Result<Campaign> {
        sqlx::query_as::<_, CampaignRow>(
            r#"
            UPDATE campaigns SET
                total_contacts = $3,
                pending_count = $3 - sent_count - send_failed_count,
                updated_at = NOW()
            WHERE id = $1 AND vendor_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(total)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", id)))?
        .try_into()
    }

    async fn increment_counters(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        delta: CounterDelta,
    ) -> Result<Campaign> {
        // SET expressions read the pre-update row, so pending uses old + delta.
        sqlx::query_as::<_, CampaignRow>(
            r#"
            UPDATE campaigns SET
                sent_count = sent_count + $3,
                delivered_count = delivered_count + $4,
                read_count = read_count + $5,
                failed_count = failed_count + $6,
                send_failed_count = send_failed_count + $7,
                pending_count = total_contacts - (sent_count + $3) - (send_failed_count + $7),
                updated_at = NOW()
            WHERE id = $1 AND vendor_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(delta.sent)
        .bind(delta.delivered)
        .bind(delta.read)
        .bind(delta.failed)
        .bind(delta.send_failed)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", id)))?
        .try_into()
    }

    async fn soft_delete_drafts(&self, ctx: &TenantContext, ids: &[CampaignId]) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET deleted_at = NOW(), updated_at = NOW()
            WHERE vendor_id = $1 AND id = ANY($2) AND status = 'DRAFT' AND deleted_at IS NULL
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(ids)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'SCHEDULED' AND deleted_at IS NULL AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        convert_all(rows)
    }

    async fn list_running(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns WHERE status = 'RUNNING' AND deleted_at IS NULL ORDER BY started_at ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        convert_all(rows)
    }

    async fn list_recurring_completed_without_successor(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'COMPLETED'
              AND deleted_at IS NULL
              AND next_instance_id IS NULL
              AND schedule->>'type' = 'RECURRING'
            ORDER BY ended_at ASC
            "#,
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        convert_all(rows)
    }

    async fn set_next_instance(
        &self,
        ctx: &TenantContext,
        id: CampaignId,
        next_id: CampaignId,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET next_instance_id = $3, updated_at = NOW()
            WHERE id = $1 AND vendor_id = $2 AND next_instance_id IS NULL
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(next_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }
}
