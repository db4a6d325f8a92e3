//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the intake domain to external systems:
//! - `ai` - Completion and classification backends (OpenAI, mocks)
//! - `storage` - Session stores (in-memory, YAML files)

pub mod ai;
pub mod storage;

pub use ai::{
    LlmClassificationService, MockClassificationService, MockCompletionService,
    OpenAICompletionService, OpenAIConfig,
};
pub use storage::{FileSessionStore, InMemorySessionStore};
