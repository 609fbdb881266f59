mod api;
mod message;

pub use api::{
    AccountCreatedRequest, HealthResponse, HelloWorldRequest, InfoResponse, MessageResponse,
    OrderConfirmRequest, TemplateMessageRequest, TemplateRef, TemplateRequest, TextMessageRequest,
};
pub use message::{
    ACCOUNT_CREATED_TEMPLATE, ComponentKind, DocumentLink, HELLO_WORLD_TEMPLATE, Language,
    MessageBody, ORDER_CONFIRM_TEMPLATE, OutboundMessage, TemplateComponent, TemplateKind,
    TemplateParameter, TemplatePayload,
};
