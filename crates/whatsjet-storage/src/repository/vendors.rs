//! Vendor repository

use crate::db::DatabasePool;
use crate::models::{CreateVendor, Vendor};
use crate::repository::db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use whatsjet_common::types::VendorId;
use whatsjet_common::Result;

/// Vendor repository trait
#[async_trait]
pub trait VendorRepository: Send + Sync {
    async fn create(&self, input: CreateVendor) -> Result<Vendor>;
    async fn get(&self, id: VendorId) -> Result<Option<Vendor>>;
}

#[derive(Debug, FromRow)]
struct VendorRow {
    id: Uuid,
    name: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
    waba_id: Option<String>,
    webhook_verify_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VendorRow> for Vendor {
    fn from(row: VendorRow) -> Self {
        Vendor {
            id: row.id,
            name: row.name,
            access_token: row.access_token,
            phone_number_id: row.phone_number_id,
            waba_id: row.waba_id,
            webhook_verify_token: row.webhook_verify_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database vendor repository
pub struct DbVendorRepository {
    pool: DatabasePool,
}

impl DbVendorRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VendorRepository for DbVendorRepository {
    async fn create(&self, input: CreateVendor) -> Result<Vendor> {
        let id = Uuid::now_v7();
        let credentials = input.credentials.as_ref();

        let row = sqlx::query_as::<_, VendorRow>(
            r#"
            INSERT INTO vendors (id, name, access_token, phone_number_id, waba_id, webhook_verify_token)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(credentials.map(|c| c.access_token.as_str()))
        .bind(credentials.map(|c| c.phone_number_id.as_str()))
        .bind(credentials.map(|c| c.waba_id.as_str()))
        .bind(&input.webhook_verify_token)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(row.into())
    }

    async fn get(&self, id: VendorId) -> Result<Option<Vendor>> {
        let row = sqlx::query_as::<_, VendorRow>("SELECT * FROM vendors WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)?;

        Ok(row.map(Vendor::from))
    }
}
