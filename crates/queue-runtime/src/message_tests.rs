//! Tests for message types and identifiers.

use super::*;

mod queue_name_tests {
    use super::*;

    #[test]
    fn test_valid_queue_names() {
        for name in ["orders", "orders-v2", "team_a.orders", "tenant/orders", "Q1"] {
            assert!(
                QueueName::new(name.to_string()).is_ok(),
                "{} should be a valid queue name",
                name
            );
        }
    }

    #[test]
    fn test_empty_queue_name_rejected() {
        let err = QueueName::new(String::new()).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_overlong_queue_name_rejected() {
        let err = QueueName::new("a".repeat(261)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_invalid_characters_rejected() {
        let err = QueueName::new("orders queue".to_string()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_must_start_and_end_with_alphanumeric() {
        assert!(QueueName::new("-orders".to_string()).is_err());
        assert!(QueueName::new("orders/".to_string()).is_err());
    }

    #[test]
    fn test_parse_from_str() {
        let name: QueueName = "people".parse().unwrap();
        assert_eq!(name.as_str(), "people");
        assert_eq!(name.to_string(), "people");
    }
}

mod message_id_tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!("".parse::<MessageId>().is_err());
        assert_eq!("abc".parse::<MessageId>().unwrap().as_str(), "abc");
    }
}

#[test]
fn test_json_message_sets_content_type() {
    let message = Message::json(b"{\"a\":1}".to_vec());
    assert_eq!(message.content_type.as_deref(), Some("application/json"));
    assert_eq!(message.size(), 7);
}

#[test]
fn test_lock_token_debug_is_redacted() {
    let token = LockToken::new("secret-lock".to_string());
    assert!(!format!("{:?}", token).contains("secret-lock"));
    assert_eq!(token.as_str(), "secret-lock");
}
