//! WhatsApp Business webhook payloads and signature checks

use super::{EventKind, InboundEvent};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use whatsjet_common::types::VendorId;
use whatsjet_storage::models::MessageContent;

const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";

/// Header Meta signs webhook bodies with
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    pub value: Option<ChangeValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WaMessage>,
    #[serde(default)]
    pub statuses: Vec<WaStatus>,
    #[serde(default)]
    pub message_deliveries: Vec<WaReceipt>,
    #[serde(default)]
    pub message_reads: Vec<WaReceipt>,
}

#[derive(Debug, Deserialize)]
pub struct WaMessage {
    pub id: String,
    pub from: String,
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Option<WaText>,
    pub image: Option<WaMedia>,
    pub document: Option<WaMedia>,
    pub audio: Option<WaMedia>,
    pub video: Option<WaMedia>,
}

#[derive(Debug, Deserialize)]
pub struct WaText {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WaMedia {
    pub id: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub voice: bool,
}

#[derive(Debug, Deserialize)]
pub struct WaStatus {
    pub id: String,
    pub status: String,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub errors: Vec<WaError>,
}

#[derive(Debug, Deserialize)]
pub struct WaError {
    pub code: Option<i64>,
    pub title: Option<String>,
    pub message: Option<String>,
}

/// Entry of the legacy `message_deliveries` / `message_reads` arrays
#[derive(Debug, Deserialize)]
pub struct WaReceipt {
    pub id: String,
    pub timestamp: Option<String>,
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn message_content(message: &WaMessage) -> MessageContent {
    let media = |m: &Option<WaMedia>| m.as_ref().map(|m| (m.id.clone(), m.mime_type.clone()));
    match message.message_type.as_str() {
        "text" => MessageContent::text(
            message
                .text
                .as_ref()
                .map(|t| t.body.clone())
                .unwrap_or_default(),
        ),
        "image" => {
            let (id, mime_type) = media(&message.image).unwrap_or_default();
            MessageContent::Image {
                id,
                link: None,
                mime_type,
                caption: message.image.as_ref().and_then(|m| m.caption.clone()),
            }
        }
        "document" => {
            let (id, mime_type) = media(&message.document).unwrap_or_default();
            MessageContent::Document {
                id,
                link: None,
                filename: message.document.as_ref().and_then(|m| m.filename.clone()),
                mime_type,
            }
        }
        "audio" => {
            let (id, mime_type) = media(&message.audio).unwrap_or_default();
            MessageContent::Audio {
                id,
                link: None,
                mime_type,
                voice: message.audio.as_ref().map(|m| m.voice).unwrap_or(false),
            }
        }
        "video" => {
            let (id, mime_type) = media(&message.video).unwrap_or_default();
            MessageContent::Video {
                id,
                link: None,
                mime_type,
                caption: message.video.as_ref().and_then(|m| m.caption.clone()),
            }
        }
        _ => MessageContent::text("Unsupported message type"),
    }
}

fn status_error(status: &WaStatus) -> Option<String> {
    status.errors.first().map(|e| {
        let text = e
            .message
            .clone()
            .or_else(|| e.title.clone())
            .unwrap_or_else(|| "Delivery failed".to_string());
        match e.code {
            Some(code) => format!("{} (code {})", text, code),
            None => text,
        }
    })
}

/// Flatten a webhook body into typed events, in payload order
pub fn normalize(vendor_id: VendorId, payload: &WebhookPayload) -> Vec<InboundEvent> {
    if payload.object != BUSINESS_ACCOUNT_OBJECT {
        return Vec::new();
    }

    let mut events = Vec::new();
    let values = payload
        .entry
        .iter()
        .flat_map(|e| e.changes.iter())
        .filter_map(|c| c.value.as_ref());

    for value in values {
        for message in &value.messages {
            events.push(InboundEvent {
                vendor_id,
                timestamp: parse_timestamp(message.timestamp.as_deref()),
                kind: EventKind::MessageReceived {
                    provider_message_id: message.id.clone(),
                    sender_phone: message.from.clone(),
                    content: message_content(message),
                },
            });
        }

        for status in &value.statuses {
            let provider_message_id = status.id.clone();
            let kind = match status.status.as_str() {
                "delivered" => EventKind::Delivered {
                    provider_message_id,
                },
                "read" => EventKind::Read {
                    provider_message_id,
                },
                "failed" => EventKind::Failed {
                    provider_message_id,
                    error: status_error(status),
                },
                // "sent" is already recorded when the send call returns
                _ => continue,
            };
            events.push(InboundEvent {
                vendor_id,
                timestamp: parse_timestamp(status.timestamp.as_deref()),
                kind,
            });
        }

        for receipt in &value.message_deliveries {
            events.push(InboundEvent {
                vendor_id,
                timestamp: parse_timestamp(receipt.timestamp.as_deref()),
                kind: EventKind::Delivered {
                    provider_message_id: receipt.id.clone(),
                },
            });
        }

        for receipt in &value.message_reads {
            events.push(InboundEvent {
                vendor_id,
                timestamp: parse_timestamp(receipt.timestamp.as_deref()),
                kind: EventKind::Read {
                    provider_message_id: receipt.id.clone(),
                },
            });
        }
    }

    events
}

/// `sha256=<hex>` signature of `body` under `secret`
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check an `X-Hub-Signature-256` header value against `body`
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_sig) = header.and_then(|h| h.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(signature) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uuid::Uuid;

    fn payload(value: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{ "id": "waba-1", "changes": [{ "field": "messages", "value": value }] }]
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_messages_and_statuses() {
        let vendor = Uuid::new_v4();
        let events = normalize(
            vendor,
            &payload(json!({
                "messaging_product": "whatsapp",
                "messages": [
                    { "id": "wamid.IN1", "from": "15551234567", "timestamp": "1717236000",
                      "type": "text", "text": { "body": "STOP" } },
                    { "id": "wamid.IN2", "from": "15551234567", "type": "sticker", "sticker": {} }
                ],
                "statuses": [
                    { "id": "wamid.OUT1", "status": "sent", "timestamp": "1717236001" },
                    { "id": "wamid.OUT1", "status": "delivered", "timestamp": "1717236002" },
                    { "id": "wamid.OUT2", "status": "failed",
                      "errors": [{ "code": 131026, "title": "Message undeliverable" }] }
                ]
            })),
        );

        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            InboundEvent {
                vendor_id: vendor,
                timestamp: Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()),
                kind: EventKind::MessageReceived {
                    provider_message_id: "wamid.IN1".to_string(),
                    sender_phone: "15551234567".to_string(),
                    content: MessageContent::text("STOP"),
                },
            }
        );
        assert_eq!(
            events[1].kind,
            EventKind::MessageReceived {
                provider_message_id: "wamid.IN2".to_string(),
                sender_phone: "15551234567".to_string(),
                content: MessageContent::text("Unsupported message type"),
            }
        );
        assert_eq!(
            events[2].kind,
            EventKind::Delivered {
                provider_message_id: "wamid.OUT1".to_string()
            }
        );
        assert_eq!(
            events[3].kind,
            EventKind::Failed {
                provider_message_id: "wamid.OUT2".to_string(),
                error: Some("Message undeliverable (code 131026)".to_string()),
            }
        );
    }

    #[test]
    fn test_normalize_legacy_arrays() {
        let events = normalize(
            Uuid::new_v4(),
            &payload(json!({
                "message_deliveries": [{ "id": "wamid.A", "timestamp": "1717236000" }],
                "message_reads": [{ "id": "wamid.A" }]
            })),
        );
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(kinds, vec!["delivered", "read"]);
    }

    #[test]
    fn test_other_objects_are_ignored() {
        let body: WebhookPayload = serde_json::from_value(json!({ "object": "page", "entry": [] })).unwrap();
        assert!(normalize(Uuid::new_v4(), &body).is_empty());
    }

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let header = compute_signature(b"app-secret", body).unwrap();
        assert!(header.starts_with("sha256="));
        assert!(verify_signature(b"app-secret", body, Some(&header)));
        assert!(!verify_signature(b"other-secret", body, Some(&header)));
        assert!(!verify_signature(b"app-secret", body, Some("sha256=zz")));
        assert!(!verify_signature(b"app-secret", body, None));
    }
}
