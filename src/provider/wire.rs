//! JSON shapes exchanged with the WhatsApp Cloud API.

use serde::{Deserialize, Serialize};

use crate::models::{MessageBody, TemplatePayload};

/// Top-level request body of `POST /{version}/{phone_number_id}/messages`.
#[derive(Debug, Serialize)]
pub(crate) struct SendEnvelope<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(flatten)]
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Content<'a> {
    Template { template: &'a TemplatePayload },
    Text { text: TextContent<'a> },
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    body: &'a str,
}

impl<'a> SendEnvelope<'a> {
    pub(crate) fn new(to: &'a str, body: &'a MessageBody) -> Self {
        let content = match body {
            MessageBody::Template(template) => Content::Template { template },
            MessageBody::Text(text) => Content::Text {
                text: TextContent { body: text },
            },
        };

        Self {
            messaging_product: "whatsapp",
            to,
            content,
        }
    }
}

/// Successful send response. Only the message ids are read.
#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

impl SendResponse {
    /// Id of the first accepted message, if any.
    pub(crate) fn into_message_id(self) -> Option<String> {
        self.messages.into_iter().next().map(|m| m.id)
    }
}
