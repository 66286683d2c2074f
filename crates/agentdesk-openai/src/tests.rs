// Unit tests for the OpenAI transport

#[cfg(test)]
mod transport_tests {
    use crate::OpenAiTransport;
    use agentdesk_core::DeskConfig;
    use std::time::Duration;

    #[test]
    fn test_default_endpoint() {
        let transport = OpenAiTransport::new();
        assert_eq!(
            transport.api_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_with_base_url() {
        let transport = OpenAiTransport::with_base_url("https://custom.api.com/v1/completions");
        assert_eq!(transport.api_url(), "https://custom.api.com/v1/completions");
        assert!(format!("{:?}", transport).contains("custom.api.com"));
    }

    #[test]
    fn test_with_timeout() {
        let transport = OpenAiTransport::with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.api_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_from_config_uses_override() {
        let config = DeskConfig {
            api_url: Some("http://localhost:4000/v1/chat/completions".to_string()),
            ..DeskConfig::default()
        };
        let transport = OpenAiTransport::from_config(&config);
        assert_eq!(
            transport.api_url(),
            "http://localhost:4000/v1/chat/completions"
        );

        let transport = OpenAiTransport::from_config(&DeskConfig::default());
        assert_eq!(
            transport.api_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
