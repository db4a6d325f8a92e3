//! Completion and classification adapters.
//!
//! ## Available Adapters
//!
//! - `MockCompletionService` - Configurable completion mock for testing
//! - `MockClassificationService` - Rule-driven classifier mock for testing
//! - `OpenAICompletionService` - OpenAI-compatible chat completions
//! - `LlmClassificationService` - Classification through any completion service

mod llm_classifier;
mod mock_classifier;
mod mock_completion;
mod openai_completion;

pub use llm_classifier::LlmClassificationService;
pub use mock_classifier::MockClassificationService;
pub use mock_completion::{MockCompletionService, DEFAULT_MOCK_REPLY};
pub use openai_completion::{OpenAICompletionService, OpenAIConfig};
