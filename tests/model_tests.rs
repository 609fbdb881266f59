//! Tests for the public message models and validators.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;

mod template_tests {
    use super::*;
    use whatsapp_relay::models::{
        HelloWorldRequest, OrderConfirmRequest, TemplateComponent, TemplateKind,
        TemplateMessageRequest, TemplateParameter, TemplateRequest,
    };

    #[test]
    fn test_hello_world_request_resolves_fixed_template() {
        let request: HelloWorldRequest =
            serde_json::from_value(json!({"to_number": "+14155552671"})).unwrap();
        let (to, kind) = request.into_parts();

        assert_eq!(to, "+14155552671");
        assert_eq!(kind, TemplateKind::HelloWorld);
        assert_eq!(kind.name(), "hello_world");
    }

    #[test]
    fn test_generic_request_keeps_caller_language() {
        let request: TemplateMessageRequest = serde_json::from_value(json!({
            "to_number": "+447911123456",
            "template": {"name": "promo", "language": {"code": "de"}},
            "components": [
                {"type": "body", "parameters": [{"type": "text", "text": "Max"}]}
            ]
        }))
        .unwrap();

        let (_, kind) = request.into_parts();
        let payload = kind.into_payload("en_US");

        assert_eq!(payload.language.code, "de");
        assert_eq!(
            payload.components,
            vec![TemplateComponent::body(vec![TemplateParameter::text("Max")])]
        );
    }

    #[test]
    fn test_generic_request_rejects_unknown_component_type() {
        let result: Result<TemplateMessageRequest, _> = serde_json::from_value(json!({
            "to_number": "+447911123456",
            "template": {"name": "promo", "language": {"code": "de"}},
            "components": [{"type": "footer", "parameters": []}]
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_order_confirm_payload_shape() {
        let request: OrderConfirmRequest = serde_json::from_value(json!({
            "to_number": "+14155552671",
            "card_type": "Mastercard",
            "merchant_name": "Corner Shop",
            "document_type": "receipt",
            "pdf_url": "https://files.example.com/r/42.pdf"
        }))
        .unwrap();

        let (_, kind) = request.into_parts();
        let payload = serde_json::to_value(kind.into_payload("en_GB")).unwrap();

        assert_eq!(
            payload,
            json!({
                "name": "order_confirm",
                "language": {"code": "en_GB"},
                "components": [
                    {
                        "type": "header",
                        "parameters": [{
                            "type": "document",
                            "document": {"link": "https://files.example.com/r/42.pdf"}
                        }]
                    },
                    {
                        "type": "body",
                        "parameters": [
                            {"type": "text", "text": "Mastercard"},
                            {"type": "text", "text": "Corner Shop"},
                            {"type": "text", "text": "receipt"}
                        ]
                    }
                ]
            })
        );
    }

    #[test]
    fn test_order_confirm_rejects_relative_url() {
        let result: Result<OrderConfirmRequest, _> = serde_json::from_value(json!({
            "to_number": "+14155552671",
            "card_type": "Visa",
            "merchant_name": "Acme",
            "document_type": "invoice",
            "pdf_url": "/invoice.pdf"
        }));

        assert!(result.is_err());
    }
}

mod validation_tests {
    use whatsapp_relay::validation::{
        ContentError, MAX_MESSAGE_LENGTH, NormalizedPhoneNumber, sanitize_message,
        validate_message_content, validate_phone_number,
    };

    #[test]
    fn test_phone_numbers() {
        assert!(validate_phone_number("+5511987654321"));
        assert!(validate_phone_number("447911123456"));
        assert!(!validate_phone_number("+44 7911 123456"));
        assert!(!validate_phone_number("+0044"));
    }

    #[test]
    fn test_normalized_number_round_trips_display() {
        let phone = NormalizedPhoneNumber::parse("447911123456").unwrap();
        assert_eq!(phone.to_string(), "+447911123456");
        assert_eq!(phone.as_wire(), "447911123456");
    }

    #[test]
    fn test_content_then_sanitize() {
        let raw = "Your code is <1234>\r\n";
        assert_eq!(validate_message_content(raw), Ok(()));
        assert_eq!(sanitize_message(raw), "Your code is &lt;1234&gt;");

        let too_long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert_eq!(
            validate_message_content(&too_long),
            Err(ContentError::TooLong)
        );
    }
}
