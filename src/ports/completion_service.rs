//! Completion Service Port - Interface for chat-completion backends.
//!
//! The orchestrator asks this port for every generated reply and for the
//! auxiliary extraction prompts. It never retries: a failure is reported to
//! the caller, which answers with the fixed apology instead.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CompletionService for Echo {
//!     async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ServiceError> {
//!         let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
//!         Ok(CompletionResponse::new(last, "echo"))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::UserId;
use crate::domain::intake::{BuiltPrompt, PromptMessage, PromptRole};

/// Port for chat-completion providers.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate a single completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ServiceError>;

    /// Provider name for logging.
    fn name(&self) -> &str {
        "completion"
    }
}

/// Request for a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Ordered messages, system preamble first.
    pub messages: Vec<Message>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// User the request is made for, for tracing.
    pub user_id: Option<UserId>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            max_tokens: 350,
            temperature: 0.8,
            user_id: None,
        }
    }

    /// Builds a request from an assembled prompt.
    pub fn from_prompt(prompt: BuiltPrompt) -> Self {
        Self {
            messages: prompt.messages.into_iter().map(Message::from).collect(),
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
            user_id: None,
        }
    }

    pub fn with_message(mut self, role: MessageRole, content: impl Into<String>) -> Self {
        self.messages.push(Message::new(role, content));
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Content of the last user message, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// A message in the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

impl From<PromptMessage> for Message {
    fn from(message: PromptMessage) -> Self {
        let role = match message.role {
            PromptRole::System => MessageRole::System,
            PromptRole::User => MessageRole::User,
            PromptRole::Assistant => MessageRole::Assistant,
        };
        Self::new(role, message.content)
    }
}

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Response from a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Generated content.
    pub content: String,
    /// Model that produced it.
    pub model: String,
}

impl CompletionResponse {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
        }
    }
}

/// Errors from completion and classification backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Rate limited by provider.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u32 },

    /// Provider is unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// API key rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// The call did not finish within the configured limit.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl ServiceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn timeout(limit: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: limit.as_millis() as u64,
        }
    }

    /// Returns true if a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::RateLimited { .. }
                | ServiceError::Unavailable { .. }
                | ServiceError::Network(_)
                | ServiceError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let request = CompletionRequest::new()
            .with_message(MessageRole::System, "Seja breve")
            .with_message(MessageRole::User, "Olá")
            .with_max_tokens(150)
            .with_temperature(0.1)
            .for_user(UserId::new("u-1").unwrap());

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.max_tokens, 150);
        assert_eq!(request.temperature, 0.1);
        assert_eq!(request.last_user_content(), Some("Olá"));
        assert_eq!(request.user_id.as_ref().map(UserId::as_str), Some("u-1"));
    }

    #[test]
    fn prompt_conversion_keeps_order_and_roles() {
        let prompt = BuiltPrompt {
            messages: vec![
                PromptMessage::system("preâmbulo"),
                PromptMessage::user("oi"),
                PromptMessage::assistant("olá"),
            ],
            max_tokens: 150,
            temperature: 0.8,
            truncated_count: 0,
            estimated_tokens: 10,
        };
        let request = CompletionRequest::from_prompt(prompt);

        let roles: Vec<MessageRole> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(request.max_tokens, 150);
    }

    #[test]
    fn retryable_classification() {
        assert!(ServiceError::unavailable("down").is_retryable());
        assert!(ServiceError::timeout(std::time::Duration::from_secs(2)).is_retryable());
        assert!(!ServiceError::AuthenticationFailed.is_retryable());
        assert!(!ServiceError::parse("bad json").is_retryable());
    }

    #[test]
    fn timeout_displays_milliseconds() {
        let err = ServiceError::timeout(std::time::Duration::from_millis(1500));
        assert_eq!(err.to_string(), "request timed out after 1500ms");
    }

    #[test]
    fn message_role_serializes_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
