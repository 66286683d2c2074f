// Chat completion wire types
//
// Request and response bodies of an OpenAI-compatible chat completion API.
// Transports serialize these as-is.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Chat completion request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Chat completion response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionResponse {
    /// A response with one assistant choice
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![CompletionChoice {
                message: Some(ChoiceMessage {
                    role: Some("assistant".to_string()),
                    content: Some(content.into()),
                }),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
            model: None,
        }
    }

    /// Content of the first choice, if any
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Error body returned by the provider on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    pub error: ProviderErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl ProviderErrorBody {
    /// Extract `error.message` from a raw body, if it parses and is non-empty
    pub fn message_from(body: &str) -> Option<String> {
        serde_json::from_str::<ProviderErrorBody>(body)
            .ok()
            .and_then(|b| b.error.message)
            .filter(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![ChatMessage::system("Be brief"), ChatMessage::user("hi")],
            temperature: 0.5,
            max_tokens: 64,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "Be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "temperature": 0.5,
                "max_tokens": 64
            })
        );
    }

    #[test]
    fn test_response_parsing() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
        });

        let response: CompletionResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.first_content(), Some("Hello!"));
        assert_eq!(response.usage.unwrap().total_tokens, 11);
    }

    #[test]
    fn test_response_without_choices() {
        let response: CompletionResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.choices.is_empty());
        assert_eq!(response.first_content(), None);
    }

    #[test]
    fn test_provider_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            ProviderErrorBody::message_from(body),
            Some("Incorrect API key provided".to_string())
        );
        assert_eq!(ProviderErrorBody::message_from("<html>"), None);
        assert_eq!(
            ProviderErrorBody::message_from(r#"{"error":{"message":""}}"#),
            None
        );
    }
}
