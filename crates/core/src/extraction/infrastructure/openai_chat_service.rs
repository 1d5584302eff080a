use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::extraction::domain::extraction_prompt::ExtractionPrompt;
use crate::extraction::domain::understanding_service::{ServiceError, UnderstandingService};
use crate::shared::constants::{
    DEFAULT_MAX_TOKENS, DEFAULT_OPENAI_MODEL, DEFAULT_TEMPERATURE, OPENAI_API_BASE,
    SERVICE_TIMEOUT_SECS,
};

// OpenAI-compatible chat completions request/response
#[derive(Serialize, Debug, PartialEq)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Debug, PartialEq)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// `UnderstandingService` backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiChatService {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::blocking::Client,
}

impl OpenAiChatService {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(SERVICE_TIMEOUT_SECS))
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into().trim().to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            client,
        })
    }

    /// Reads `OPENAI_API_KEY`, plus optional `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    /// Returns `None` when no key is set.
    pub fn from_env() -> Option<Result<Self, ServiceError>> {
        let key = std::env::var("OPENAI_API_KEY").ok()?;
        if key.trim().is_empty() {
            return None;
        }
        Some(Self::new(key).map(|service| {
            let service = match std::env::var("OPENAI_MODEL") {
                Ok(model) if !model.trim().is_empty() => service.with_model(&model),
                _ => service,
            };
            match std::env::var("OPENAI_BASE_URL") {
                Ok(url) if !url.trim().is_empty() => service.with_base_url(&url),
                _ => service,
            }
        }))
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.trim().to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &ExtractionPrompt) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.user.clone(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl UnderstandingService for OpenAiChatService {
    fn complete(&self, prompt: &ExtractionPrompt) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), body));
        }

        extract_content(&body)
    }
}

/// Rate limiting and server errors are transient; other statuses are rejections.
fn classify_status(status: u16, body: String) -> ServiceError {
    if status == 429 || status >= 500 {
        ServiceError::Unavailable(format!("HTTP {status}"))
    } else {
        ServiceError::Rejected {
            status,
            message: body.chars().take(200).collect(),
        }
    }
}

/// Pulls the first choice's message text out of a chat-completions body.
///
/// A body that is not a chat completion at all is a service fault, not a
/// malformed extraction, so it maps to `ServiceError`.
fn extract_content(body: &str) -> Result<String, ServiceError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Unavailable(format!("invalid completion body: {e}")))?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::domain::extraction_prompt::PromptStrictness;

    fn prompt() -> ExtractionPrompt {
        ExtractionPrompt {
            chunk_index: 0,
            system: "sys".to_string(),
            user: "usr".to_string(),
            strictness: PromptStrictness::Standard,
        }
    }

    #[test]
    fn test_request_body_carries_prompt_and_settings() {
        let service = OpenAiChatService::new("key").unwrap().with_model("gpt-4o-mini");
        let body = service.request_body(&prompt());
        assert_eq!(body.model, "gpt-4o-mini");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].content, "usr");
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["content"], "sys");
    }

    #[test]
    fn test_defaults() {
        let service = OpenAiChatService::new("  key \n").unwrap();
        assert_eq!(service.model(), DEFAULT_OPENAI_MODEL);
        assert_eq!(service.api_key, "key");
        assert_eq!(service.base_url, OPENAI_API_BASE);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let service = OpenAiChatService::new("k")
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(service.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_extract_content_first_choice() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "[]");
    }

    #[test]
    fn test_extract_content_no_choices_is_empty_text() {
        assert_eq!(extract_content(r#"{"choices": []}"#).unwrap(), "");
    }

    #[test]
    fn test_extract_content_invalid_body_is_service_error() {
        assert!(matches!(
            extract_content("<html>bad gateway</html>"),
            Err(ServiceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(429, String::new()),
            ServiceError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(503, String::new()),
            ServiceError::Unavailable(_)
        ));
        assert_eq!(
            classify_status(401, "bad key".to_string()),
            ServiceError::Rejected {
                status: 401,
                message: "bad key".to_string()
            }
        );
    }

    #[test]
    fn test_unreachable_host_is_unavailable() {
        let service = OpenAiChatService::new("k")
            .unwrap()
            .with_base_url("http://invalid.nonexistent.example.com");
        assert!(matches!(
            service.complete(&prompt()),
            Err(ServiceError::Unavailable(_))
        ));
    }
}
