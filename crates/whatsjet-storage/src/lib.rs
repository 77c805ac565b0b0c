//! WhatsJet Storage - Data access layer
//!
//! This crate provides the PostgreSQL pool, typed domain models, the
//! tenant-scoped repository traits with their PostgreSQL implementations,
//! and an in-memory backend.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;

use repository::{
    CampaignRepository, ContactRepository, DbCampaignRepository, DbContactRepository,
    DbMessageRepository, DbRecipientRepository, DbVendorRepository, MessageRepository,
    RecipientRepository, VendorRepository,
};
use std::sync::Arc;

/// Repository bundle shared by the pipeline components
#[derive(Clone)]
pub struct Storage {
    pub vendors: Arc<dyn VendorRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub recipients: Arc<dyn RecipientRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

impl Storage {
    /// PostgreSQL-backed repositories
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            vendors: Arc::new(DbVendorRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            recipients: Arc::new(DbRecipientRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool)),
        }
    }

    /// Repositories sharing one in-memory store
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            vendors: store.clone(),
            contacts: store.clone(),
            campaigns: store.clone(),
            recipients: store.clone(),
            messages: store,
        }
    }
}
