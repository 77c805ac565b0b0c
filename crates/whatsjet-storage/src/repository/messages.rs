//! Message repository

use crate::db::DatabasePool;
use crate::models::{Message, MessageContent, NewMessage, StatusAdvance};
use crate::repository::{db_err, decode_err};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use whatsjet_common::types::{CampaignId, ContactId, MessageDirection, MessageId, MessageStatus};
use whatsjet_common::{Error, Result, TenantContext};

/// Extra fields written together with a status advance
#[derive(Debug, Clone, Default)]
pub struct AdvanceDetail {
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, ctx: &TenantContext, input: NewMessage) -> Result<Message>;

    /// Return the outbound message for (campaign, contact), creating it as
    /// PENDING if it does not exist yet
    async fn get_or_create_for_campaign(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
        content: MessageContent,
    ) -> Result<Message>;

    async fn get(&self, ctx: &TenantContext, id: MessageId) -> Result<Option<Message>>;

    /// Outbound message carrying the provider's id
    async fn find_by_provider_id(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
    ) -> Result<Option<Message>>;

    async fn find_inbound_by_provider_id(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
    ) -> Result<Option<Message>>;

    /// Move the message to `next` if that is a forward step from its
    /// current status. Returns `None` when the write was not an edge.
    async fn advance_status(
        &self,
        ctx: &TenantContext,
        id: MessageId,
        next: MessageStatus,
        detail: AdvanceDetail,
    ) -> Result<Option<StatusAdvance>>;

    async fn list_for_campaign(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
    ) -> Result<Vec<Message>>;
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    vendor_id: Uuid,
    contact_id: Uuid,
    campaign_id: Option<Uuid>,
    direction: String,
    message_type: String,
    content: Json<MessageContent>,
    status: String,
    provider_message_id: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id,
            vendor_id: row.vendor_id,
            contact_id: row.contact_id,
            campaign_id: row.campaign_id,
            direction: row.direction.parse().map_err(|e| decode_err("message", e))?,
            message_type: row
                .message_type
                .parse()
                .map_err(|e| decode_err("message", e))?,
            content: row.content.0,
            status: row.status.parse().map_err(|e| decode_err("message", e))?,
            provider_message_id: row.provider_message_id,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AdvanceRow {
    #[sqlx(flatten)]
    message: MessageRow,
    previous_status: String,
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn find_by_provider_id_in(
        &self,
        ctx: &TenantContext,
        direction: MessageDirection,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT * FROM messages
            WHERE vendor_id = $1 AND direction = $2 AND provider_message_id = $3
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(direction.to_string())
        .bind(provider_message_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?
        .map(Message::try_from)
        .transpose()
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, ctx: &TenantContext, input: NewMessage) -> Result<Message> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (
                id, vendor_id, contact_id, campaign_id, direction, message_type,
                content, status, provider_message_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(input.contact_id)
        .bind(input.campaign_id)
        .bind(input.direction.to_string())
        .bind(input.content.message_type().as_str())
        .bind(Json(&input.content))
        .bind(input.status.as_str())
        .bind(&input.provider_message_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Conflict("Message already recorded".to_string())
            }
            other => db_err(other),
        })?
        .try_into()
    }

    async fn get_or_create_for_campaign(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
        content: MessageContent,
    ) -> Result<Message> {
        let inserted = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (
                id, vendor_id, contact_id, campaign_id, direction, message_type, content, status
            )
            VALUES ($1, $2, $3, $4, 'OUTBOUND', $5, $6, 'PENDING')
            ON CONFLICT (campaign_id, contact_id)
                WHERE campaign_id IS NOT NULL AND direction = 'OUTBOUND'
                DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(ctx.vendor_id)
        .bind(contact_id)
        .bind(campaign_id)
        .bind(content.message_type().as_str())
        .bind(Json(&content))
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        if let Some(row) = inserted {
            return row.try_into();
        }

        sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT * FROM messages
            WHERE vendor_id = $1 AND campaign_id = $2 AND contact_id = $3 AND direction = 'OUTBOUND'
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(campaign_id)
        .bind(contact_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?
        .try_into()
    }

    async fn get(&self, ctx: &TenantContext, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1 AND vendor_id = $2")
            .bind(id)
            .bind(ctx.vendor_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)?
            .map(Message::try_from)
            .transpose()
    }

    async fn find_by_provider_id(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        self.find_by_provider_id_in(ctx, MessageDirection::Outbound, provider_message_id)
            .await
    }

    async fn find_inbound_by_provider_id(
        &self,
        ctx: &TenantContext,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        self.find_by_provider_id_in(ctx, MessageDirection::Inbound, provider_message_id)
            .await
    }

    async fn advance_status(
        &self,
        ctx: &TenantContext,
        id: MessageId,
        next: MessageStatus,
        detail: AdvanceDetail,
    ) -> Result<Option<StatusAdvance>> {
        let predecessors: Vec<&'static str> = MessageStatus::predecessors_of(next)
            .iter()
            .map(|s| s.as_str())
            .collect();

        let row = sqlx::query_as::<_, AdvanceRow>(
            r#"
            WITH current AS (
                SELECT id, status FROM messages
                WHERE id = $1 AND vendor_id = $2
                FOR UPDATE
            )
            UPDATE messages m SET
                status = $3,
                provider_message_id = COALESCE($4, m.provider_message_id),
                error = COALESCE($5, m.error),
                updated_at = NOW()
            FROM current
            WHERE m.id = current.id AND current.status = ANY($6)
            RETURNING m.*, current.status AS previous_status
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(next.as_str())
        .bind(&detail.provider_message_id)
        .bind(&detail.error)
        .bind(&predecessors)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        row.map(|r| {
            let previous = r
                .previous_status
                .parse()
                .map_err(|e| decode_err("message", e))?;
            Ok(StatusAdvance {
                message: r.message.try_into()?,
                previous,
            })
        })
        .transpose()
    }

    async fn list_for_campaign(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT * FROM messages
            WHERE vendor_id = $1 AND campaign_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Message::try_from).collect()
    }
}
