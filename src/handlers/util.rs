//! Shared utilities for handlers.

use axum::extract::FromRequest;

use crate::error::AppError;

/// JSON body extractor whose rejections use the API's error shape.
///
/// Bad data (missing field, wrong type, invalid URL), unparseable JSON and a
/// wrong content type all become 422 `validation_failed`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        to_number: String,
    }

    async fn extract(content_type: &str, body: &str) -> Result<AppJson<Payload>, AppError> {
        let req = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        AppJson::<Payload>::from_request(req, &()).await
    }

    #[tokio::test]
    async fn test_valid_body() {
        let AppJson(payload) = extract("application/json", r#"{"to_number":"+1"}"#)
            .await
            .unwrap();
        assert_eq!(payload.to_number, "+1");
    }

    #[tokio::test]
    async fn test_missing_field_is_422() {
        let err = extract("application/json", "{}").await.unwrap_err();
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_syntax_error_is_422() {
        let err = extract("application/json", "{not json").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_422() {
        let err = extract("text/plain", r#"{"to_number":"+1"}"#)
            .await
            .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
