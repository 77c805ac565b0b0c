//! Repository layer for data access
//!
//! Every trait method that touches tenant data takes a [`TenantContext`] and
//! scopes its query by `vendor_id`. The `Db*` types are the PostgreSQL
//! implementations; [`crate::memory::MemoryStore`] implements every trait for
//! tests and single-process runs.
//!
//! [`TenantContext`]: whatsjet_common::TenantContext

pub mod campaigns;
pub mod contacts;
pub mod messages;
pub mod recipients;
pub mod vendors;

pub use campaigns::{CampaignRepository, DbCampaignRepository};
pub use contacts::{ContactRepository, DbContactRepository};
pub use messages::{AdvanceDetail, DbMessageRepository, MessageRepository};
pub use recipients::{DbRecipientRepository, RecipientRepository};
pub use vendors::{DbVendorRepository, VendorRepository};

use whatsjet_common::Error;

pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

pub(crate) fn decode_err(what: &str, e: impl std::fmt::Display) -> Error {
    Error::Database(format!("Corrupt {} row: {}", what, e))
}
