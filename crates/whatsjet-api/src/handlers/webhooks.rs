//! WhatsApp webhook handlers
//!
//! `GET` answers Meta's subscription handshake; `POST` accepts change
//! notifications, normalises them and hands them to the inbound processor.
//! Any event that fails to apply answers 500 so the provider redelivers;
//! replays are absorbed by the processor.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use whatsjet_common::types::VendorId;
use whatsjet_core::inbound::webhook::{normalize, verify_signature, WebhookPayload, SIGNATURE_HEADER};
use whatsjet_storage::models::Vendor;

use super::{api_error, error_response, ApiResult};
use crate::auth::AppState;

/// `hub.*` query parameters of the verification handshake
#[derive(Debug, Deserialize)]
pub struct HubQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: usize,
}

async fn load_vendor(state: &AppState, vendor_id: VendorId) -> ApiResult<Vendor> {
    state
        .storage
        .vendors
        .get(vendor_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "Unknown vendor"))
}

/// GET /webhooks/whatsapp/:vendor_id
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(vendor_id): Path<VendorId>,
    Query(query): Query<HubQuery>,
) -> ApiResult<String> {
    let vendor = load_vendor(&state, vendor_id).await?;

    let token_matches = match (&vendor.webhook_verify_token, &query.verify_token) {
        (Some(expected), Some(given)) => !expected.is_empty() && expected == given,
        _ => false,
    };
    if query.mode.as_deref() != Some("subscribe") || !token_matches {
        warn!(vendor_id = %vendor_id, mode = ?query.mode, "Webhook verification rejected");
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Webhook verification failed",
        ));
    }

    info!(vendor_id = %vendor_id, "Webhook verified");
    Ok(query.challenge.unwrap_or_default())
}

/// POST /webhooks/whatsapp/:vendor_id
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Path(vendor_id): Path<VendorId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    if let Some(secret) = state.app_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !verify_signature(secret.as_bytes(), &body, signature) {
            warn!(vendor_id = %vendor_id, "Webhook signature mismatch");
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid webhook signature",
            ));
        }
    }

    load_vendor(&state, vendor_id).await?;

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            format!("Malformed webhook payload: {}", e),
        )
    })?;

    let events = normalize(vendor_id, &payload);
    let received = events.len();
    debug!(vendor_id = %vendor_id, events = received, "Webhook normalised");

    let results = state.processor.process_all(events).await;
    if let Some(failure) = results.into_iter().find_map(Result::err) {
        return Err(api_error(failure));
    }

    Ok(Json(WebhookAck { received }))
}
