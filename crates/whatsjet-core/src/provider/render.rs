//! Template Renderer - personalises campaign payloads per contact

use super::OutboundMessage;
use regex::{Captures, Regex};
use whatsjet_common::types::MessageType;
use whatsjet_common::{Error, Result};
use whatsjet_storage::models::{Contact, MessageContent, MessagePayload};

/// Renderer for `{{placeholder}}` substitution
pub struct TemplateRenderer {
    placeholder: Regex,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let placeholder = Regex::new(r"\{\{\s*([^}]*?)\s*\}\}")
            .map_err(|e| Error::Internal(format!("Invalid placeholder pattern: {}", e)))?;
        Ok(Self { placeholder })
    }

    /// Substitute contact fields; unknown placeholders are removed
    pub fn render_text(&self, template: &str, contact: &Contact) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| {
                match caps.get(1).map(|m| m.as_str()).unwrap_or_default() {
                    "first_name" => contact.first_name.clone(),
                    "last_name" => contact.last_name.clone().unwrap_or_default(),
                    "name" | "full_name" => contact.full_name(),
                    "phone_number" | "phone" => contact.phone_number.clone(),
                    "email" => contact.email.clone().unwrap_or_default(),
                    "company" => contact.company.clone().unwrap_or_default(),
                    _ => String::new(),
                }
            })
            .into_owned()
    }

    /// Render a campaign payload for one contact
    pub fn render(&self, payload: &MessagePayload, contact: &Contact) -> OutboundMessage {
        match payload {
            MessagePayload::Text { body, media: None } => OutboundMessage::Text {
                body: self.render_text(body, contact),
            },
            MessagePayload::Text {
                body,
                media: Some(media),
            } => {
                let caption = media
                    .caption
                    .as_deref()
                    .map(|c| self.render_text(c, contact))
                    .or_else(|| Some(self.render_text(body, contact)))
                    .filter(|c| !c.is_empty());
                OutboundMessage::Media {
                    media_type: media.media_type,
                    link: media.link.clone(),
                    // WhatsApp rejects captions on audio
                    caption: caption.filter(|_| media.media_type != MessageType::Audio),
                    filename: media.filename.clone(),
                }
            }
            MessagePayload::Template {
                name,
                language,
                parameters,
                header_media,
            } => OutboundMessage::Template {
                name: name.clone(),
                language: language.clone(),
                parameters: parameters
                    .iter()
                    .map(|p| self.render_text(p, contact))
                    .collect(),
                header_media: header_media.clone(),
            },
            MessagePayload::Flow { flow_id, body } => OutboundMessage::Flow {
                flow_id: flow_id.clone(),
                body: self.render_text(body, contact),
            },
        }
    }
}

/// Stored content of the outbound message created for a payload
pub fn content_of(payload: &MessagePayload) -> MessageContent {
    match payload {
        MessagePayload::Text { body, media: None } => MessageContent::text(body.clone()),
        MessagePayload::Text {
            body,
            media: Some(media),
        } => {
            let link = Some(media.link.clone());
            let caption = media.caption.clone().or_else(|| Some(body.clone()));
            match media.media_type {
                MessageType::Image => MessageContent::Image {
                    id: None,
                    link,
                    mime_type: None,
                    caption,
                },
                MessageType::Video => MessageContent::Video {
                    id: None,
                    link,
                    mime_type: None,
                    caption,
                },
                MessageType::Audio => MessageContent::Audio {
                    id: None,
                    link,
                    mime_type: None,
                    voice: false,
                },
                MessageType::Document => MessageContent::Document {
                    id: None,
                    link,
                    filename: media.filename.clone(),
                    mime_type: None,
                },
                MessageType::Text => MessageContent::text(body.clone()),
            }
        }
        MessagePayload::Template { name, language, .. } => {
            MessageContent::text(format!("[template {} ({})]", name, language))
        }
        MessagePayload::Flow { body, .. } => MessageContent::text(body.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use whatsjet_storage::models::MediaAttachment;

    fn create_test_contact() -> Contact {
        Contact {
            id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            phone_number: "+15551234567".to_string(),
            first_name: "John".to_string(),
            last_name: Some("Doe".to_string()),
            email: Some("john@example.com".to_string()),
            company: None,
            tags: vec![],
            is_opted_out: false,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_basic_template() {
        let renderer = TemplateRenderer::new().unwrap();
        let rendered = renderer.render_text(
            "Hello {{first_name}}, is {{ phone_number }} still yours, {{name}}?",
            &create_test_contact(),
        );
        assert_eq!(
            rendered,
            "Hello John, is +15551234567 still yours, John Doe?"
        );
    }

    #[test]
    fn test_render_removes_unused() {
        let renderer = TemplateRenderer::new().unwrap();
        let rendered =
            renderer.render_text("Hi {{first_name}}{{unknown}} from {{company}}.", &create_test_contact());
        assert_eq!(rendered, "Hi John from .");
    }

    #[test]
    fn test_render_template_parameters() {
        let renderer = TemplateRenderer::new().unwrap();
        let payload = MessagePayload::Template {
            name: "order_update".to_string(),
            language: "en_US".to_string(),
            parameters: vec!["{{first_name}}".to_string(), "42".to_string()],
            header_media: None,
        };

        match renderer.render(&payload, &create_test_contact()) {
            OutboundMessage::Template { parameters, .. } => {
                assert_eq!(parameters, vec!["John".to_string(), "42".to_string()])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_media_caption_falls_back_to_body() {
        let renderer = TemplateRenderer::new().unwrap();
        let payload = MessagePayload::Text {
            body: "Look, {{first_name}}!".to_string(),
            media: Some(MediaAttachment {
                media_type: MessageType::Image,
                link: "https://cdn.example.com/a.png".to_string(),
                caption: None,
                filename: None,
            }),
        };

        assert_eq!(
            renderer.render(&payload, &create_test_contact()),
            OutboundMessage::Media {
                media_type: MessageType::Image,
                link: "https://cdn.example.com/a.png".to_string(),
                caption: Some("Look, John!".to_string()),
                filename: None,
            }
        );
    }
}
