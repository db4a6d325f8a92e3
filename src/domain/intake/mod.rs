//! Client intake domain.
//!
//! Walks a prospective client from first contact to a generated power of
//! attorney: phase workflow, topic tracking, field extraction, escalation
//! containment and prompt assembly. Everything here is synchronous and pure
//! over a [`Session`]; I/O lives behind the ports.

mod context;
mod dedup;
mod documents;
mod engine;
mod entity;
mod escalation;
mod extractor;
mod phase;
mod session;
mod topic;

pub use context::{
    BuiltPrompt, ContextWindowManager, PromptMessage, PromptRole, REPLY_TEMPERATURE,
};
pub use dedup::{DedupPolicy, DEFAULT_DEDUP_WINDOW};
pub use documents::{
    checklist_for, is_document_confirmation, is_document_rejection, required_documents,
    should_generate, DocumentData, DocumentKind, DocumentStatus,
};
pub use engine::{
    reconfirm_counterpart, PhaseEngine, PhaseStep, TurnInput, ALL_DOCUMENTS_RECEIVED, APOLOGY,
    ASK_CORRECTION, CONFIRMED_GENERATE, DOCUMENT_CONFIRMED, READY_TO_GENERATE, SICKNESS_BENEFIT,
};
pub use entity::{digits_only, format_id, looks_like_id, names_related, EntityExtractor};
pub use escalation::{
    hard_lock_message, is_handoff_request, redirect_message, signals_service_change,
    soft_lock_message, EscalationGuard, EscalationLevel, EscalationState, GuardInput,
    GuardVerdict, HardLockOutcome, IdentitySnapshot,
};
pub use extractor::{ClientData, ClientDataExtractor, ExtractionError};
pub use phase::IntakePhase;
pub use session::{
    CollectedFields, ExchangeRecord, PendingDocumentConfirmation, Session, Turn, TurnRole,
    DEFAULT_DISPLAY_NAME,
};
pub use topic::{Topic, TopicClassifier};
