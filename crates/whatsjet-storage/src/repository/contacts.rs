//! Contact repository

use crate::db::DatabasePool;
use crate::models::{Contact, CreateContact};
use crate::repository::db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use whatsjet_common::types::ContactId;
use whatsjet_common::{Error, Result, TenantContext};

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn create(&self, ctx: &TenantContext, input: CreateContact) -> Result<Contact>;
    async fn get(&self, ctx: &TenantContext, id: ContactId) -> Result<Option<Contact>>;
    async fn find_by_phone(&self, ctx: &TenantContext, phone: &str) -> Result<Option<Contact>>;

    /// Find the live contact for `phone`, creating a placeholder if none
    /// exists. The flag is true when a contact was created.
    async fn find_or_create_by_phone(
        &self,
        ctx: &TenantContext,
        phone: &str,
    ) -> Result<(Contact, bool)>;

    /// Contacts that are neither opted out nor deleted, in creation order
    async fn list_live(&self, ctx: &TenantContext) -> Result<Vec<Contact>>;
    async fn list_live_with_tag(&self, ctx: &TenantContext, tag: &str) -> Result<Vec<Contact>>;
    async fn set_opted_out(&self, ctx: &TenantContext, id: ContactId, opted_out: bool)
        -> Result<()>;
    async fn soft_delete(&self, ctx: &TenantContext, id: ContactId) -> Result<()>;
}

#[derive(Debug, FromRow)]
struct ContactRow {
    id: Uuid,
    vendor_id: Uuid,
    phone_number: String,
    first_name: String,
    last_name: Option<String>,
    email: Option<String>,
    company: Option<String>,
    tags: Vec<String>,
    is_opted_out: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id,
            vendor_id: row.vendor_id,
            phone_number: row.phone_number,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            company: row.company,
            tags: row.tags,
            is_opted_out: row.is_opted_out,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn create(&self, ctx: &TenantContext, input: CreateContact) -> Result<Contact> {
        let id = Uuid::now_v7();

        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            INSERT INTO contacts (id, vendor_id, phone_number, first_name, last_name, email, company, tags)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(&input.phone_number)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.email)
        .bind(&input.company)
        .bind(&input.tags)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::Conflict(format!(
                "Contact with phone number {} already exists",
                input.phone_number
            )),
            other => db_err(other),
        })?;

        Ok(row.into())
    }

    async fn get(&self, ctx: &TenantContext, id: ContactId) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>(
            "SELECT * FROM contacts WHERE id = $1 AND vendor_id = $2",
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Contact::from))
    }

    async fn find_by_phone(&self, ctx: &TenantContext, phone: &str) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT * FROM contacts
            WHERE vendor_id = $1 AND phone_number = $2 AND NOT is_deleted
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(phone)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(Contact::from))
    }

    async fn find_or_create_by_phone(
        &self,
        ctx: &TenantContext,
        phone: &str,
    ) -> Result<(Contact, bool)> {
        let placeholder = CreateContact::placeholder(phone);

        // The partial unique index makes concurrent first messages from the
        // same number converge on one row.
        let inserted = sqlx::query_as::<_, ContactRow>(
            r#"
            INSERT INTO contacts (id, vendor_id, phone_number, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (vendor_id, phone_number) WHERE NOT is_deleted DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(ctx.vendor_id)
        .bind(&placeholder.phone_number)
        .bind(&placeholder.first_name)
        .bind(&placeholder.last_name)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        if let Some(row) = inserted {
            return Ok((row.into(), true));
        }

        self.find_by_phone(ctx, phone)
            .await?
            .map(|c| (c, false))
            .ok_or_else(|| Error::Internal(format!("Contact for {} vanished", phone)))
    }

    async fn list_live(&self, ctx: &TenantContext) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT * FROM contacts
            WHERE vendor_id = $1 AND NOT is_opted_out AND NOT is_deleted
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(ctx.vendor_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn list_live_with_tag(&self, ctx: &TenantContext, tag: &str) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT * FROM contacts
            WHERE vendor_id = $1 AND NOT is_opted_out AND NOT is_deleted AND $2 = ANY(tags)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(ctx.vendor_id)
        .bind(tag)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn set_opted_out(
        &self,
        ctx: &TenantContext,
        id: ContactId,
        opted_out: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE contacts SET is_opted_out = $3, updated_at = NOW() WHERE id = $1 AND vendor_id = $2",
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .bind(opted_out)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn soft_delete(&self, ctx: &TenantContext, id: ContactId) -> Result<()> {
        sqlx::query(
            "UPDATE contacts SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND vendor_id = $2",
        )
        .bind(id)
        .bind(ctx.vendor_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
