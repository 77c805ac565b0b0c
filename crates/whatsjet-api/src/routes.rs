//! API routes

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{tenant_middleware, AppState};
use crate::handlers::{campaigns, health, webhooks};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    // Health check routes (no tenant required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Webhooks identify the vendor by path and authenticate by signature
    let webhook_routes = Router::new()
        .route("/whatsapp/:vendor_id", get(webhooks::verify))
        .route("/whatsapp/:vendor_id", post(webhooks::receive))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/", delete(campaigns::delete_campaigns))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id", put(campaigns::update_campaign))
        .route("/:campaign_id", delete(campaigns::delete_campaign))
        .route("/:campaign_id/status", patch(campaigns::update_status))
        .route("/:campaign_id/stats", get(campaigns::get_campaign_stats));

    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tenant_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .nest("/health", health_routes)
        .route("/metrics", get(health::metrics).with_state(state.clone()))
        .nest("/webhooks", webhook_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::VENDOR_HEADER;
    use crate::handlers::campaigns::DeleteCampaignsResponse;
    use crate::handlers::webhooks::WebhookAck;
    use crate::handlers::ErrorResponse;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;
    use whatsjet_common::config::Config;
    use whatsjet_common::types::{CampaignStatus, MessageStatus, VendorId};
    use whatsjet_common::TenantContext;
    use whatsjet_core::inbound::webhook::compute_signature;
    use whatsjet_core::{CampaignManager, Dispatcher, InboundProcessor, MemoryQueue, Metrics, VendorRateLimiter};
    use whatsjet_storage::models::{CreateContact, CreateVendor, MessageContent};
    use whatsjet_storage::Storage;

    struct TestApp {
        router: Router,
        storage: Storage,
        manager: Arc<CampaignManager>,
        vendor_id: VendorId,
    }

    async fn test_app(app_secret: Option<&str>) -> TestApp {
        let config = Config::default();
        let storage = Storage::in_memory();
        let metrics = Arc::new(Metrics::new().unwrap());
        let queue = Arc::new(MemoryQueue::new());
        let limiter = Arc::new(VendorRateLimiter::new(&config.dispatch));
        let dispatcher = Arc::new(Dispatcher::new(
            storage.clone(),
            queue,
            limiter,
            &config.dispatch,
        ));
        let manager = Arc::new(CampaignManager::new(
            storage.clone(),
            dispatcher,
            metrics.clone(),
        ));
        let mut inbound = config.inbound.clone();
        inbound.orphan_retry_attempts = 1;
        let processor = Arc::new(InboundProcessor::new(
            storage.clone(),
            manager.clone(),
            metrics.clone(),
            &inbound,
        ));

        let vendor = storage
            .vendors
            .create(CreateVendor {
                name: "Acme Retail".to_string(),
                credentials: None,
                webhook_verify_token: Some("verify-me".to_string()),
            })
            .await
            .unwrap();

        let router = create_router(AppState {
            storage: storage.clone(),
            manager: manager.clone(),
            processor,
            metrics,
            db_pool: None,
            app_secret: app_secret.map(str::to_string),
        });

        TestApp {
            router,
            storage,
            manager,
            vendor_id: vendor.id,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            (status, body)
        }

        async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(VENDOR_HEADER, self.vendor_id.to_string())
                .header("content-type", "application/json");
            let body = body.map(|b| Body::from(b.to_string())).unwrap_or_default();
            self.send(builder.body(body).unwrap()).await
        }

        fn ctx(&self) -> TenantContext {
            TenantContext::new(self.vendor_id)
        }
    }

    fn campaign_body(name: &str) -> Value {
        json!({
            "name": name,
            "campaign_type": "BULK_MESSAGE",
            "audience": { "type": "ALL_CONTACTS" },
            "message": { "kind": "text", "body": "Hi {{first_name}}" }
        })
    }

    fn status_webhook(provider_message_id: &str, status: &str) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "waba-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "statuses": [{
                            "id": provider_message_id,
                            "status": status,
                            "timestamp": "1718000000",
                            "recipient_id": "15550100000"
                        }]
                    }
                }]
            }]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(None).await;
        let (status, body) = app
            .send(Request::get("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_campaign_routes_require_vendor() {
        let app = test_app(None).await;
        let (status, body) = app
            .send(Request::get("/api/v1/campaigns").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let error: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.error, "UNAUTHORIZED");

        let (status, _) = app
            .send(
                Request::get("/api/v1/campaigns")
                    .header(VENDOR_HEADER, Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_campaign_lifecycle_over_http() {
        let app = test_app(None).await;

        let (status, created) = app
            .call("POST", "/api/v1/campaigns", Some(campaign_body("Launch")))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "DRAFT");
        assert_eq!(created["stats"]["total_contacts"], 0);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, updated) = app
            .call(
                "PUT",
                &format!("/api/v1/campaigns/{}", id),
                Some(json!({ "description": "Summer range" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["description"], "Summer range");

        // No contacts: the campaign completes as soon as it starts.
        let (status, running) = app
            .call(
                "PATCH",
                &format!("/api/v1/campaigns/{}/status", id),
                Some(json!({ "status": "RUNNING" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(running["status"], "COMPLETED");

        let (status, body) = app
            .call(
                "PATCH",
                &format!("/api/v1/campaigns/{}/status", id),
                Some(json!({ "status": "PAUSED" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "INVALID_TRANSITION");

        let (status, body) = app
            .call(
                "PUT",
                &format!("/api/v1/campaigns/{}", id),
                Some(json!({ "name": "Too late" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_invalid_campaign_is_rejected() {
        let app = test_app(None).await;
        let mut body = campaign_body("Broken filter");
        body["audience"] = json!({ "type": "CUSTOM_FILTER", "value": "tag ==" });

        let (status, error) = app.call("POST", "/api/v1/campaigns", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["error"], "AUDIENCE_RESOLUTION_ERROR");
    }

    #[tokio::test]
    async fn test_list_filters_and_deletes() {
        let app = test_app(None).await;
        let mut ids = Vec::new();
        for name in ["Spring sale", "Summer sale", "Newsletter"] {
            let (_, created) = app
                .call("POST", "/api/v1/campaigns", Some(campaign_body(name)))
                .await;
            ids.push(created["id"].as_str().unwrap().to_string());
        }
        app.manager
            .transition_status(&app.ctx(), ids[2].parse().unwrap(), CampaignStatus::Running)
            .await
            .unwrap();

        let (status, page) = app
            .call("GET", "/api/v1/campaigns?search=sale&limit=1", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 2);
        assert_eq!(page["pages"], 2);
        assert_eq!(page["data"].as_array().unwrap().len(), 1);

        let (_, completed) = app
            .call("GET", "/api/v1/campaigns?status=completed", None)
            .await;
        assert_eq!(completed["total"], 1);

        let (status, _) = app
            .call("GET", "/api/v1/campaigns?status=bogus", None)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, deleted) = app
            .call("DELETE", "/api/v1/campaigns", Some(json!({ "ids": ids })))
            .await;
        assert_eq!(status, StatusCode::OK);
        let deleted: DeleteCampaignsResponse = serde_json::from_value(deleted).unwrap();
        assert_eq!(deleted.deleted, 2);

        let (_, remaining) = app.call("GET", "/api/v1/campaigns", None).await;
        assert_eq!(remaining["total"], 1);
        assert_eq!(remaining["data"][0]["name"], "Newsletter");
    }

    #[tokio::test]
    async fn test_webhook_handshake() {
        let app = test_app(None).await;
        let uri = |token: &str| {
            format!(
                "/webhooks/whatsapp/{}?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1158201444",
                app.vendor_id, token
            )
        };

        let (status, body) = app
            .send(Request::get(uri("verify-me")).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(1158201444));

        let (status, _) = app
            .send(Request::get(uri("wrong")).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_webhook_signature_is_enforced() {
        let app = test_app(Some("app-secret")).await;
        let payload = status_webhook("wamid.UNKNOWN", "delivered").to_string();
        let uri = format!("/webhooks/whatsapp/{}", app.vendor_id);

        let (status, _) = app
            .send(
                Request::post(uri.as_str())
                    .header("x-hub-signature-256", "sha256=00")
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let signature = compute_signature(b"app-secret", payload.as_bytes()).unwrap();
        let (status, body) = app
            .send(
                Request::post(uri.as_str())
                    .header("x-hub-signature-256", signature)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let ack: WebhookAck = serde_json::from_value(body).unwrap();
        assert_eq!(ack.received, 1);
    }

    #[tokio::test]
    async fn test_webhook_status_updates_message() {
        let app = test_app(None).await;
        let ctx = app.ctx();
        let contact = app
            .storage
            .contacts
            .create(
                &ctx,
                CreateContact {
                    phone_number: "+15550100000".to_string(),
                    first_name: "Ann".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (_, created) = app
            .call("POST", "/api/v1/campaigns", Some(campaign_body("Launch")))
            .await;
        let campaign_id = created["id"].as_str().unwrap().parse().unwrap();

        let message = app
            .storage
            .messages
            .get_or_create_for_campaign(&ctx, campaign_id, contact.id, MessageContent::text("Hi Ann"))
            .await
            .unwrap();
        app.storage
            .messages
            .advance_status(
                &ctx,
                message.id,
                MessageStatus::Sent,
                whatsjet_storage::repository::AdvanceDetail {
                    provider_message_id: Some("wamid.HTTP1".to_string()),
                    error: None,
                },
            )
            .await
            .unwrap();

        let uri = format!("/webhooks/whatsapp/{}", app.vendor_id);
        let (status, _) = app
            .send(
                Request::post(uri.as_str())
                    .body(Body::from(status_webhook("wamid.HTTP1", "read").to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let stored = app
            .storage
            .messages
            .get(&ctx, message.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MessageStatus::Read);

        let (status, _) = app
            .send(
                Request::post(uri.as_str())
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
