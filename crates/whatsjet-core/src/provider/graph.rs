//! WhatsApp Cloud API (Graph API) provider

use super::{MessagingProvider, OutboundMessage, ProviderError, SendReceipt};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use whatsjet_common::config::ProviderConfig;
use whatsjet_common::types::MessageType;
use whatsjet_common::{Error, Result};
use whatsjet_storage::models::{MediaAttachment, VendorCredentials};

/// Graph API error codes that signal throttling
const THROTTLE_CODES: &[i64] = &[4, 80007, 130429, 131048, 131056];

/// Graph API error code for an invalid or expired access token
const AUTH_CODE: i64 = 190;

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    code: Option<i64>,
    error_subcode: Option<i64>,
}

/// Client for `POST /{version}/{phone_number_id}/messages`
pub struct GraphApiProvider {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl GraphApiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        })
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url, self.api_version, phone_number_id
        )
    }
}

/// Request body for one outbound message
pub(crate) fn build_body(to: &str, message: &OutboundMessage) -> Value {
    let mut body = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
    });

    match message {
        OutboundMessage::Text { body: text } => {
            body["type"] = json!("text");
            body["text"] = json!({ "preview_url": false, "body": text });
        }
        OutboundMessage::Media {
            media_type,
            link,
            caption,
            filename,
        } => {
            let kind = media_kind(*media_type);
            let mut media = json!({ "link": link });
            if let Some(caption) = caption {
                media["caption"] = json!(caption);
            }
            if let (MessageType::Document, Some(filename)) = (media_type, filename) {
                media["filename"] = json!(filename);
            }
            body["type"] = json!(kind);
            body[kind] = media;
        }
        OutboundMessage::Template {
            name,
            language,
            parameters,
            header_media,
        } => {
            let mut components = Vec::new();
            if let Some(header) = header_media {
                components.push(header_component(header));
            }
            if !parameters.is_empty() {
                let params: Vec<Value> = parameters
                    .iter()
                    .map(|p| json!({ "type": "text", "text": p }))
                    .collect();
                components.push(json!({ "type": "body", "parameters": params }));
            }

            body["type"] = json!("template");
            body["template"] = json!({
                "name": name,
                "language": { "code": language },
                "components": components,
            });
        }
        OutboundMessage::Flow { flow_id, body: text } => {
            body["type"] = json!("interactive");
            body["interactive"] = json!({
                "type": "flow",
                "body": { "text": text },
                "action": {
                    "name": "flow",
                    "parameters": {
                        "flow_message_version": "3",
                        "flow_id": flow_id,
                        "flow_cta": "Start",
                    }
                }
            });
        }
    }

    body
}

fn media_kind(media_type: MessageType) -> &'static str {
    match media_type {
        MessageType::Image => "image",
        MessageType::Document => "document",
        MessageType::Audio => "audio",
        MessageType::Video => "video",
        MessageType::Text => "text",
    }
}

fn header_component(media: &MediaAttachment) -> Value {
    let kind = media_kind(media.media_type);
    json!({
        "type": "header",
        "parameters": [{ "type": kind, kind: { "link": media.link } }],
    })
}

/// Classify a non-success Graph API response
pub fn classify_failure(status: u16, code: Option<i64>, message: &str) -> ProviderError {
    let detail = match code {
        Some(code) => format!("HTTP {} (code {}): {}", status, code, message),
        None => format!("HTTP {}: {}", status, message),
    };

    if status == 401 || status == 403 || code == Some(AUTH_CODE) {
        return ProviderError::Auth(detail);
    }
    if status == 429 || code.map(|c| THROTTLE_CODES.contains(&c)).unwrap_or(false) {
        return ProviderError::Transient(detail);
    }
    if status >= 500 {
        return ProviderError::Transient(detail);
    }
    ProviderError::Permanent(detail)
}

/// Normalise a phone number: digits with a leading `+`, assuming `+1` for
/// 10-digit numbers
pub fn format_phone_number(raw: &str) -> String {
    let has_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if has_plus {
        return format!("+{}", digits);
    }
    match digits.len() {
        10 => format!("+1{}", digits),
        _ => format!("+{}", digits),
    }
}

#[async_trait]
impl MessagingProvider for GraphApiProvider {
    async fn send(
        &self,
        credentials: &VendorCredentials,
        to: &str,
        message: &OutboundMessage,
    ) -> std::result::Result<SendReceipt, ProviderError> {
        let to = format_phone_number(to);
        let url = self.messages_url(&credentials.phone_number_id);
        let body = build_body(&to, message);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Transient(format!("Request timed out: {}", e))
                } else {
                    ProviderError::Transient(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => {
                    debug!(
                        code = ?envelope.error.code,
                        subcode = ?envelope.error.error_subcode,
                        "Graph API error"
                    );
                    (envelope.error.code, envelope.error.message)
                }
                Err(_) => (None, text),
            };
            let failure = classify_failure(status.as_u16(), code, &message);
            warn!(to = %to, error = %failure, "WhatsApp send rejected");
            return Err(failure);
        }

        let parsed: SendResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::Permanent(format!("Unexpected send response: {}", e))
        })?;

        // Accepted without an id: retrying would risk a duplicate send.
        let id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| ProviderError::Permanent("Send response carried no message id".into()))?;

        debug!(to = %to, provider_message_id = %id, "WhatsApp send accepted");
        Ok(SendReceipt {
            provider_message_id: id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> VendorCredentials {
        VendorCredentials {
            access_token: "test-token".to_string(),
            phone_number_id: "1055".to_string(),
            waba_id: "waba-1".to_string(),
        }
    }

    fn provider(server: &MockServer) -> GraphApiProvider {
        GraphApiProvider::new(&ProviderConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_format_phone_number() {
        assert_eq!(format_phone_number("(555) 123-4567"), "+15551234567");
        assert_eq!(format_phone_number("1 555 123 4567"), "+15551234567");
        assert_eq!(format_phone_number("+44 20 7946 0958"), "+442079460958");
        assert_eq!(format_phone_number("919876543210"), "+919876543210");
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(classify_failure(401, None, ""), ProviderError::Auth(_)));
        assert!(matches!(classify_failure(400, Some(190), ""), ProviderError::Auth(_)));
        assert!(matches!(classify_failure(429, None, ""), ProviderError::Transient(_)));
        assert!(matches!(classify_failure(400, Some(130429), ""), ProviderError::Transient(_)));
        assert!(matches!(classify_failure(503, None, ""), ProviderError::Transient(_)));
        assert!(matches!(classify_failure(400, Some(131026), ""), ProviderError::Permanent(_)));
        assert!(matches!(classify_failure(404, Some(132001), ""), ProviderError::Permanent(_)));
    }

    #[test]
    fn test_template_body() {
        let body = build_body(
            "+15551234567",
            &OutboundMessage::Template {
                name: "welcome".to_string(),
                language: "en_US".to_string(),
                parameters: vec!["Ann".to_string()],
                header_media: None,
            },
        );
        assert_eq!(body["type"], "template");
        assert_eq!(body["template"]["language"]["code"], "en_US");
        assert_eq!(
            body["template"]["components"][0]["parameters"][0]["text"],
            "Ann"
        );
    }

    #[tokio::test]
    async fn test_send_text_returns_provider_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/1055/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "+15551234567",
                "type": "text",
                "text": { "body": "hi" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "contacts": [{ "input": "+15551234567", "wa_id": "15551234567" }],
                "messages": [{ "id": "wamid.ABC" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = provider(&server)
            .send(
                &credentials(),
                "5551234567",
                &OutboundMessage::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.provider_message_id, "wamid.ABC");
    }

    #[tokio::test]
    async fn test_send_maps_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "(#131026) Message undeliverable",
                    "type": "OAuthException",
                    "code": 131026,
                    "fbtrace_id": "Az"
                }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .send(
                &credentials(),
                "+15551234567",
                &OutboundMessage::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(m) if m.contains("131026")));
    }

    #[tokio::test]
    async fn test_expired_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Error validating access token", "code": 190 }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .send(
                &credentials(),
                "+15551234567",
                &OutboundMessage::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}
