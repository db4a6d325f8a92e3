//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the intake domain and the outside world. Adapters implement these ports.
//!
//! - `CompletionService` - Chat completions for generated replies and extraction
//! - `ClassificationService` - Technical-question and topic judgements
//! - `SessionStore` - Per-user session persistence

mod classification_service;
mod completion_service;
mod session_store;

pub use classification_service::{Classification, ClassificationService, ClassificationTask};
pub use completion_service::{
    CompletionRequest, CompletionResponse, CompletionService, Message, MessageRole, ServiceError,
};
pub use session_store::{SessionStore, SessionStoreError};
