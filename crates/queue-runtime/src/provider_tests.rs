//! Tests for provider types and connection string parsing.

use super::*;

const VALID: &str = "Endpoint=sb://hvalfangst.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=c2VjcmV0a2V5PQ==";

#[test]
fn test_provider_selected_from_connection_string() {
    assert_eq!(
        ProviderType::for_connection_string(&ConnectionString::new(VALID)),
        ProviderType::AzureServiceBus
    );
    assert_eq!(
        ProviderType::for_connection_string(&ConnectionString::new("memory://local")),
        ProviderType::InMemory
    );
}

#[test]
fn test_connection_string_debug_is_redacted() {
    let cs = ConnectionString::new(VALID);
    let debug = format!("{:?}", cs);
    assert!(!debug.contains("c2VjcmV0a2V5PQ"));
    assert!(!debug.contains("hvalfangst"));
}

#[test]
fn test_blank_connection_string_is_empty() {
    assert!(ConnectionString::new("   ").is_empty());
    assert!(!ConnectionString::new(VALID).is_empty());
}

mod parsing {
    use super::*;

    #[test]
    fn test_parse_valid_connection_string() {
        let info = ServiceBusConnectionInfo::parse(&ConnectionString::new(VALID)).unwrap();

        assert_eq!(
            info.endpoint.as_str(),
            "https://hvalfangst.servicebus.windows.net/"
        );
        assert_eq!(info.shared_access_key_name, "RootManageSharedAccessKey");
        // Base64 padding inside the key must survive the key=value split
        assert_eq!(info.shared_access_key.as_str(), "c2VjcmV0a2V5PQ==");
        assert!(info.entity_path.is_none());
    }

    #[test]
    fn test_parse_entity_path_and_trailing_semicolon() {
        let raw = format!("{};EntityPath=people;", VALID);
        let info = ServiceBusConnectionInfo::parse(&ConnectionString::new(raw)).unwrap();
        assert_eq!(info.entity_path.as_deref(), Some("people"));
    }

    #[test]
    fn test_entity_path_must_match_queue() {
        let people = QueueName::new("people".to_string()).unwrap();
        let orders = QueueName::new("orders".to_string()).unwrap();

        let scoped = ServiceBusConnectionInfo::parse(&ConnectionString::new(format!(
            "{};EntityPath=People",
            VALID
        )))
        .unwrap();
        assert!(scoped.check_entity(&people).is_ok());

        let err = scoped.check_entity(&orders).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid { .. }));
        assert!(err.to_string().contains("orders"));

        let namespace_wide = ServiceBusConnectionInfo::parse(&ConnectionString::new(VALID)).unwrap();
        assert!(namespace_wide.check_entity(&orders).is_ok());
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let raw = "endpoint=sb://ns.servicebus.windows.net;sharedaccesskeyname=n;sharedaccesskey=k";
        let info = ServiceBusConnectionInfo::parse(&ConnectionString::new(raw)).unwrap();
        assert_eq!(info.endpoint.as_str(), "https://ns.servicebus.windows.net/");
    }

    #[test]
    fn test_http_endpoint_used_verbatim() {
        let raw = "Endpoint=http://127.0.0.1:5300;SharedAccessKeyName=n;SharedAccessKey=k";
        let info = ServiceBusConnectionInfo::parse(&ConnectionString::new(raw)).unwrap();
        assert_eq!(info.endpoint.as_str(), "http://127.0.0.1:5300/");
    }

    #[test]
    fn test_missing_key_is_reported() {
        let raw = "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=n";
        let err = ServiceBusConnectionInfo::parse(&ConnectionString::new(raw)).unwrap_err();
        assert!(
            matches!(err, ConfigurationError::Missing { ref key } if key == "SharedAccessKey"),
            "unexpected error: {:?}",
            err
        );
    }

    #[test]
    fn test_missing_endpoint_is_reported() {
        let raw = "SharedAccessKeyName=n;SharedAccessKey=k";
        let err = ServiceBusConnectionInfo::parse(&ConnectionString::new(raw)).unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing { ref key } if key == "Endpoint"));
    }

    #[test]
    fn test_segment_without_equals_rejected() {
        let err = ServiceBusConnectionInfo::parse(&ConnectionString::new("garbage")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid { .. }));
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let raw = "Endpoint=ftp://ns/;SharedAccessKeyName=n;SharedAccessKey=k";
        let err = ServiceBusConnectionInfo::parse(&ConnectionString::new(raw)).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid { .. }));
    }

    #[test]
    fn test_parsed_info_debug_is_redacted() {
        let info = ServiceBusConnectionInfo::parse(&ConnectionString::new(VALID)).unwrap();
        assert!(!format!("{:?}", info).contains("c2VjcmV0a2V5PQ"));
    }
}

#[test]
fn test_in_memory_defaults() {
    let config = InMemoryConfig::default();
    assert_eq!(config.lock_duration, Duration::from_secs(60));
    assert_eq!(config.max_message_size, 10 * 1024 * 1024);
}
