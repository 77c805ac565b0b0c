//! Tenant resolution
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! vendor in the `X-Vendor-Id` header. Every campaign route runs with the
//! resulting [`TenantContext`] in its request extensions.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;
use whatsjet_common::types::VendorId;
use whatsjet_common::TenantContext;
use whatsjet_core::{CampaignManager, InboundProcessor, Metrics};
use whatsjet_storage::{DatabasePool, Storage};

use crate::handlers::{error_response, ApiError};

pub const VENDOR_HEADER: &str = "x-vendor-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub manager: Arc<CampaignManager>,
    pub processor: Arc<InboundProcessor>,
    pub metrics: Arc<Metrics>,
    /// Present when running against PostgreSQL; used by readiness checks
    pub db_pool: Option<DatabasePool>,
    /// Meta app secret for `X-Hub-Signature-256` checks
    pub app_secret: Option<String>,
}

/// Extract the vendor id from request headers
pub fn extract_vendor_id(req: &Request) -> Option<VendorId> {
    req.headers()
        .get(VENDOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

/// Resolve the tenant for campaign routes
pub async fn tenant_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let vendor_id = extract_vendor_id(&request).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Missing or malformed vendor header");
        error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "X-Vendor-Id header is required",
        )
    })?;

    let vendor = state.storage.vendors.get(vendor_id).await.map_err(|e| {
        error!(vendor_id = %vendor_id, error = %e, "Vendor lookup failed");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Failed to resolve vendor",
        )
    })?;
    if vendor.is_none() {
        warn!(vendor_id = %vendor_id, "Unknown vendor");
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Unknown vendor",
        ));
    }

    request
        .extensions_mut()
        .insert(TenantContext::new(vendor_id));
    Ok(next.run(request).await)
}
