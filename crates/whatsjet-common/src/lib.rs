//! WhatsJet Common - Shared types and utilities
//!
//! This crate provides configuration, the error taxonomy and the typed
//! identifiers shared across all WhatsJet components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::TenantContext;
