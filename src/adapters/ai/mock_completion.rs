//! Mock completion service for testing.
//!
//! Returns queued responses in order, then a fixed default. Every request is
//! recorded so tests can assert on prompts, token limits and call counts.
//!
//! # Example
//!
//! ```ignore
//! let service = MockCompletionService::new()
//!     .with_response("Olá! Como posso ajudar?")
//!     .with_delay(Duration::from_millis(100));
//!
//! let response = service.complete(request).await?;
//! assert_eq!(response.content, "Olá! Como posso ajudar?");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{CompletionRequest, CompletionResponse, CompletionService, ServiceError};

/// Content returned once the queue is empty.
pub const DEFAULT_MOCK_REPLY: &str = "Mock response";

const MOCK_MODEL: &str = "mock-model-1";

/// A configured mock response.
#[derive(Debug, Clone)]
enum MockResponse {
    Success(String),
    Error(ServiceError),
}

/// Mock completion service.
///
/// Configurable to return specific responses, simulate delays, or inject errors.
#[derive(Debug, Clone)]
pub struct MockCompletionService {
    /// Pre-configured responses (consumed in order).
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Simulated latency per request.
    delay: Duration,
    /// Call history for verification.
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Default for MockCompletionService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletionService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a successful response to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.push(MockResponse::Success(content.into()));
        self
    }

    /// Adds an error response to the queue.
    pub fn with_error(self, error: ServiceError) -> Self {
        self.push(MockResponse::Error(error));
        self
    }

    /// Sets simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues a response on a shared handle.
    pub fn push_response(&self, content: impl Into<String>) {
        self.push(MockResponse::Success(content.into()));
    }

    fn push(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Returns the number of calls made to this service.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Returns all recorded calls.
    pub fn get_calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the most recent call, if any.
    pub fn last_call(&self) -> Option<CompletionRequest> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Clears the call history.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockResponse::Success(DEFAULT_MOCK_REPLY.to_string()))
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ServiceError> {
        self.calls.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match self.next_response() {
            MockResponse::Success(content) => Ok(CompletionResponse::new(content, MOCK_MODEL)),
            MockResponse::Error(err) => Err(err),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MessageRole;

    fn request() -> CompletionRequest {
        CompletionRequest::new().with_message(MessageRole::User, "Olá")
    }

    #[tokio::test]
    async fn returns_queued_responses_in_order() {
        let service = MockCompletionService::new()
            .with_response("primeira")
            .with_response("segunda");

        assert_eq!(service.complete(request()).await.unwrap().content, "primeira");
        assert_eq!(service.complete(request()).await.unwrap().content, "segunda");
        assert_eq!(
            service.complete(request()).await.unwrap().content,
            DEFAULT_MOCK_REPLY
        );
    }

    #[tokio::test]
    async fn injects_errors() {
        let service = MockCompletionService::new().with_error(ServiceError::unavailable("down"));
        let result = service.complete(request()).await;
        assert!(matches!(result, Err(ServiceError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn records_calls() {
        let service = MockCompletionService::new();
        service.complete(request().with_max_tokens(150)).await.unwrap();

        assert_eq!(service.call_count(), 1);
        assert_eq!(service.last_call().unwrap().max_tokens, 150);
        service.clear_calls();
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let service = MockCompletionService::new();
        let handle = service.clone();
        handle.push_response("compartilhada");

        assert_eq!(service.complete(request()).await.unwrap().content, "compartilhada");
        assert_eq!(handle.call_count(), 1);
    }

    #[tokio::test]
    async fn delay_is_applied() {
        let service = MockCompletionService::new().with_delay(Duration::from_millis(20));
        let started = std::time::Instant::now();
        service.complete(request()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
