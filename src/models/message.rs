use serde::{Deserialize, Serialize};
use url::Url;

use crate::validation::NormalizedPhoneNumber;

/// Template used by the hello-world endpoint.
pub const HELLO_WORLD_TEMPLATE: &str = "hello_world";

/// Template used by the order-confirm endpoint.
pub const ORDER_CONFIRM_TEMPLATE: &str = "order_confirm";

/// Template used by the account-created endpoint.
pub const ACCOUNT_CREATED_TEMPLATE: &str = "account_created";

/// Template language, e.g. `{"code": "en_US"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
}

impl Language {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Position of a component inside the approved template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Header,
    Body,
}

/// Link to a hosted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub link: Url,
}

/// Typed value substituted into a template placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateParameter {
    /// `{"type": "text", "text": "..."}`
    Text { text: String },
    /// `{"type": "document", "document": {"link": "..."}}`
    Document { document: DocumentLink },
}

impl TemplateParameter {
    pub fn text(text: impl Into<String>) -> Self {
        TemplateParameter::Text { text: text.into() }
    }

    pub fn document(link: Url) -> Self {
        TemplateParameter::Document {
            document: DocumentLink { link },
        }
    }
}

/// One header or body section of a template, with its ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub parameters: Vec<TemplateParameter>,
}

impl TemplateComponent {
    pub fn header(parameters: Vec<TemplateParameter>) -> Self {
        Self {
            kind: ComponentKind::Header,
            parameters,
        }
    }

    pub fn body(parameters: Vec<TemplateParameter>) -> Self {
        Self {
            kind: ComponentKind::Body,
            parameters,
        }
    }
}

/// Template object as the provider expects it.
///
/// `components` is left out of the JSON when empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplatePayload {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<TemplateComponent>,
}

/// Every template this service knows how to send.
///
/// Each variant carries exactly the fields its template needs and is turned
/// into a [`TemplatePayload`] once by [`TemplateKind::into_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKind {
    /// Caller-named template with caller-supplied components.
    Generic {
        name: String,
        language: Language,
        components: Vec<TemplateComponent>,
    },
    HelloWorld,
    OrderConfirm {
        card_type: String,
        merchant_name: String,
        document_type: String,
        pdf_url: Url,
    },
    AccountCreated {
        name: String,
        verification_type: String,
    },
}

impl TemplateKind {
    /// Template name, for logs and metrics.
    pub fn name(&self) -> &str {
        match self {
            TemplateKind::Generic { name, .. } => name,
            TemplateKind::HelloWorld => HELLO_WORLD_TEMPLATE,
            TemplateKind::OrderConfirm { .. } => ORDER_CONFIRM_TEMPLATE,
            TemplateKind::AccountCreated { .. } => ACCOUNT_CREATED_TEMPLATE,
        }
    }

    /// Build the provider payload. Fixed templates use `default_language`.
    pub fn into_payload(self, default_language: &str) -> TemplatePayload {
        let fixed = |name: &str, components: Vec<TemplateComponent>| TemplatePayload {
            name: name.to_string(),
            language: Language::new(default_language),
            components,
        };

        match self {
            TemplateKind::Generic {
                name,
                language,
                components,
            } => TemplatePayload {
                name,
                language,
                components,
            },
            TemplateKind::HelloWorld => fixed(HELLO_WORLD_TEMPLATE, Vec::new()),
            TemplateKind::OrderConfirm {
                card_type,
                merchant_name,
                document_type,
                pdf_url,
            } => fixed(
                ORDER_CONFIRM_TEMPLATE,
                vec![
                    TemplateComponent::header(vec![TemplateParameter::document(pdf_url)]),
                    TemplateComponent::body(vec![
                        TemplateParameter::text(card_type),
                        TemplateParameter::text(merchant_name),
                        TemplateParameter::text(document_type),
                    ]),
                ],
            ),
            TemplateKind::AccountCreated {
                name,
                verification_type,
            } => fixed(
                ACCOUNT_CREATED_TEMPLATE,
                vec![TemplateComponent::body(vec![
                    TemplateParameter::text(name),
                    TemplateParameter::text(verification_type),
                ])],
            ),
        }
    }
}

/// What gets delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Template(TemplatePayload),
    /// Already sanitized free text.
    Text(String),
}

impl MessageBody {
    /// Short label for logs and metrics: the template name or `"text"`.
    pub fn label(&self) -> &str {
        match self {
            MessageBody::Template(template) => &template.name,
            MessageBody::Text(_) => "text",
        }
    }
}

/// A validated message ready for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: NormalizedPhoneNumber,
    pub body: MessageBody,
}
