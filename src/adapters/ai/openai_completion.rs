//! OpenAI-compatible chat completion adapter.
//!
//! Talks to any endpoint implementing `POST {base_url}/chat/completions`.
//! There is no retry here: the orchestrator answers a failed turn with an
//! apology and the client simply writes again.
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAIConfig::new(api_key)
//!     .with_model("gpt-4o")
//!     .with_base_url("https://api.openai.com/v1");
//!
//! let service = OpenAICompletionService::new(config)?;
//! ```

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::ports::{
    CompletionRequest, CompletionResponse, CompletionService, MessageRole, ServiceError,
};

/// Configuration for the OpenAI adapter.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    /// HTTP-level timeout. The orchestrator applies its own, usually shorter, limit.
    pub timeout: Duration,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Builds a configuration around an already-wrapped key.
    pub fn from_secret(api_key: Secret<String>) -> Self {
        Self {
            api_key,
            ..Self::new(String::new())
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// Completion service backed by the OpenAI chat API.
pub struct OpenAICompletionService {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAICompletionService {
    pub fn new(config: OpenAIConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn to_openai_request(&self, request: &CompletionRequest) -> OpenAIRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| OpenAIMessage {
                role: match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }
                .to_string(),
                content: msg.content.clone(),
            })
            .collect();

        OpenAIRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    async fn send_request(&self, request: &CompletionRequest) -> Result<Response, ServiceError> {
        self.client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .json(&self.to_openai_request(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::timeout(self.config.timeout)
                } else if e.is_connect() {
                    ServiceError::network(format!("Connection failed: {}", e))
                } else {
                    ServiceError::network(e.to_string())
                }
            })
    }

    async fn handle_response_status(&self, response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(ServiceError::AuthenticationFailed),
            429 => Err(ServiceError::RateLimited {
                retry_after_secs: parse_retry_after(&error_body),
            }),
            500..=599 => Err(ServiceError::unavailable(format!(
                "Server error {}: {}",
                status, error_body
            ))),
            _ => Err(ServiceError::network(format!(
                "Unexpected status {}: {}",
                status, error_body
            ))),
        }
    }

    async fn parse_response(&self, response: Response) -> Result<CompletionResponse, ServiceError> {
        let response = self.handle_response_status(response).await?;

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::parse(format!("Failed to parse response: {}", e)))?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::parse("No choices in response"))?;

        if let Some(usage) = openai_response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        Ok(CompletionResponse::new(
            choice.message.content.trim(),
            openai_response.model,
        ))
    }
}

/// Reads "try again in Ns" from an error body, defaulting to 30 seconds.
fn parse_retry_after(error_body: &str) -> u32 {
    serde_json::from_str::<serde_json::Value>(error_body)
        .ok()
        .and_then(|parsed| {
            let message = parsed.get("error")?.get("message")?.as_str()?.to_string();
            let idx = message.find("try again in ")?;
            let digits: String = message[idx + 13..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        })
        .unwrap_or(30)
}

#[async_trait]
impl CompletionService for OpenAICompletionService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ServiceError> {
        let response = self.send_request(&request).await?;
        self.parse_response(response).await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> OpenAICompletionService {
        OpenAICompletionService::new(
            OpenAIConfig::new("sk-test")
                .with_model("gpt-4o-mini")
                .with_base_url("http://localhost:9999/v1/"),
        )
        .unwrap()
    }

    #[test]
    fn request_conversion_maps_roles_and_limits() {
        let request = CompletionRequest::new()
            .with_message(MessageRole::System, "Você é a Sophia")
            .with_message(MessageRole::User, "Olá")
            .with_max_tokens(150)
            .with_temperature(0.8);
        let converted = service().to_openai_request(&request);

        assert_eq!(converted.model, "gpt-4o-mini");
        assert_eq!(converted.messages[0].role, "system");
        assert_eq!(converted.messages[1].role, "user");
        assert_eq!(converted.max_tokens, 150);
    }

    #[test]
    fn trailing_slash_is_removed_from_base_url() {
        assert_eq!(
            service().completions_url(),
            "http://localhost:9999/v1/chat/completions"
        );
    }

    #[test]
    fn response_body_deserializes() {
        let body = r#"{
            "model": "gpt-4o",
            "choices": [{"message": {"role": "assistant", "content": " Olá! "}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let parsed: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, " Olá! ");
        assert_eq!(parsed.usage.unwrap().completion_tokens, 3);
    }

    #[test]
    fn retry_after_is_parsed_or_defaulted() {
        let body = r#"{"error": {"message": "Rate limit reached. Please try again in 20s."}}"#;
        assert_eq!(parse_retry_after(body), 20);
        assert_eq!(parse_retry_after("not json"), 30);
    }

    #[test]
    fn api_key_is_not_debug_printed() {
        let config = OpenAIConfig::new("sk-very-secret");
        assert!(!format!("{:?}", config).contains("sk-very-secret"));
    }
}
