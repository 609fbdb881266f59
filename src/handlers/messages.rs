//! Message sending handlers.
//!
//! # Endpoints
//!
//! - `POST /api/v1/messages/` - Any approved template
//! - `POST /api/v1/messages/hello-world` - `hello_world` template
//! - `POST /api/v1/messages/order-confirm` - `order_confirm` template with PDF header
//! - `POST /api/v1/messages/account-created` - `account_created` template
//! - `POST /api/v1/messages/text` - Free text
//!
//! All respond `200 {"success": true, "message_id": "...", "status": "sent"}`.

use axum::Json;
use axum::extract::State;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::util::AppJson;
use crate::error::AppResult;
use crate::models::{MessageResponse, TemplateRequest, TextMessageRequest};
use crate::state::AppState;

/// Send a template message.
///
/// One handler serves every template endpoint; the request type decides
/// which template is built.
///
/// # Request Body (generic endpoint)
///
/// ```json
/// {
///   "to_number": "+14155552671",
///   "template": {"name": "promo", "language": {"code": "en_US"}},
///   "components": [{"type": "body", "parameters": [{"type": "text", "text": "Ana"}]}]
/// }
/// ```
#[instrument(skip(state, payload))]
pub async fn send_template<R>(
    State(state): State<AppState>,
    AppJson(payload): AppJson<R>,
) -> AppResult<Json<MessageResponse>>
where
    R: TemplateRequest + DeserializeOwned + Send + 'static,
{
    let (to_number, kind) = payload.into_parts();
    let response = state.messages.send_template(&to_number, kind).await?;

    Ok(Json(response))
}

/// Send free text.
///
/// # Request Body
///
/// ```json
/// {"to_number": "+14155552671", "message": "Your code is 1234"}
/// ```
#[instrument(skip(state, payload))]
pub async fn send_text(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TextMessageRequest>,
) -> AppResult<Json<MessageResponse>> {
    let response = state
        .messages
        .send_text(&payload.to_number, &payload.message)
        .await?;

    Ok(Json(response))
}
