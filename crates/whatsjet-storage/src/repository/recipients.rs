//! Campaign recipient snapshot repository

use crate::db::DatabasePool;
use crate::repository::db_err;
use async_trait::async_trait;
use whatsjet_common::types::{CampaignId, ContactId};
use whatsjet_common::{Result, TenantContext};

/// Recipient repository trait.
///
/// A campaign's recipients are fixed when it first enters RUNNING. Each row
/// is dispatched at most once unless explicitly reset.
#[async_trait]
pub trait RecipientRepository: Send + Sync {
    /// Insert recipients in order; existing rows are kept
    async fn insert_recipients(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64>;

    async fn next_undispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<ContactId>>;

    async fn mark_dispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<()>;

    async fn reset_dispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<()>;

    async fn count_undispatched(&self, ctx: &TenantContext, campaign_id: CampaignId)
        -> Result<i64>;
}

/// Database recipient repository
pub struct DbRecipientRepository {
    pool: DatabasePool,
}

impl DbRecipientRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientRepository for DbRecipientRepository {
    async fn insert_recipients(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO campaign_recipients (campaign_id, contact_id, position)
            SELECT $1, ids.contact_id, ids.ord
            FROM UNNEST($3::uuid[]) WITH ORDINALITY AS ids(contact_id, ord)
            WHERE EXISTS (SELECT 1 FROM campaigns WHERE id = $1 AND vendor_id = $2)
            ON CONFLICT (campaign_id, contact_id) DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(ctx.vendor_id)
        .bind(contact_ids)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn next_undispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<ContactId>> {
        sqlx::query_scalar(
            r#"
            SELECT r.contact_id FROM campaign_recipients r
            JOIN campaigns c ON c.id = r.campaign_id
            WHERE r.campaign_id = $1 AND c.vendor_id = $2 AND r.dispatched_at IS NULL
            ORDER BY r.position ASC
            LIMIT $3
            "#,
        )
        .bind(campaign_id)
        .bind(ctx.vendor_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn mark_dispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_recipients r SET dispatched_at = NOW()
            FROM campaigns c
            WHERE c.id = r.campaign_id AND c.vendor_id = $3
              AND r.campaign_id = $1 AND r.contact_id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .bind(ctx.vendor_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn reset_dispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_recipients r SET dispatched_at = NULL
            FROM campaigns c
            WHERE c.id = r.campaign_id AND c.vendor_id = $3
              AND r.campaign_id = $1 AND r.contact_id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .bind(ctx.vendor_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn count_undispatched(
        &self,
        ctx: &TenantContext,
        campaign_id: CampaignId,
    ) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM campaign_recipients r
            JOIN campaigns c ON c.id = r.campaign_id
            WHERE r.campaign_id = $1 AND c.vendor_id = $2 AND r.dispatched_at IS NULL
            "#,
        )
        .bind(campaign_id)
        .bind(ctx.vendor_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }
}
