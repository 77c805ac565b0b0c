//! WhatsJet API - HTTP surface
//!
//! Campaign lifecycle endpoints for the dashboard, the WhatsApp webhook
//! endpoint, and health and metrics endpoints.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
