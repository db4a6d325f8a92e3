//! Per-user intake session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::documents::DocumentKind;
use super::entity::format_id;
use super::escalation::EscalationState;
use super::phase::IntakePhase;
use super::topic::Topic;
use crate::domain::foundation::{SessionId, StateMachine, Timestamp, UserId};

/// Display name used when the transport does not provide one.
pub const DEFAULT_DISPLAY_NAME: &str = "cliente";

/// Role of a stored conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One entry of the stored conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Last question and answer, kept for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub question: String,
    pub answer: String,
    pub at: Timestamp,
}

/// A generated document waiting for the client's approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDocumentConfirmation {
    pub document_path: String,
    pub subject_name: String,
    pub document_kind: DocumentKind,
    pub created_at: Timestamp,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Fills `slot` only when it is still empty. Returns true if it was filled.
fn fill(slot: &mut Option<String>, value: &str) -> bool {
    if slot.is_some() {
        return false;
    }
    match non_empty(value) {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

/// Overwrites `slot` with a non-empty value. Never clears it.
fn replace(slot: &mut Option<String>, value: &str) -> bool {
    match non_empty(value) {
        Some(v) if slot.as_deref() != Some(v.as_str()) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

/// Intake fields gathered so far.
///
/// Values are filled incrementally and never cleared. Only the grantee's
/// fields can be replaced, and only after an explicit correction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedFields {
    pub subject_name: Option<String>,
    pub subject_id: Option<String>,
    pub counterpart_name: Option<String>,
    pub counterpart_id: Option<String>,
    pub address: Option<String>,
    pub requested_service: Option<String>,
    pub document_generated: bool,
    pub forwarded_to_attorney: bool,
}

impl CollectedFields {
    pub fn fill_subject_name(&mut self, name: &str) -> bool {
        fill(&mut self.subject_name, name)
    }

    pub fn fill_subject_id(&mut self, id: &str) -> bool {
        fill(&mut self.subject_id, id)
    }

    pub fn fill_counterpart_name(&mut self, name: &str) -> bool {
        fill(&mut self.counterpart_name, name)
    }

    pub fn fill_counterpart_id(&mut self, id: &str) -> bool {
        fill(&mut self.counterpart_id, id)
    }

    pub fn fill_address(&mut self, address: &str) -> bool {
        fill(&mut self.address, address)
    }

    pub fn fill_requested_service(&mut self, service: &str) -> bool {
        fill(&mut self.requested_service, service)
    }

    /// Corrects the grantee's name after the client rejected it.
    pub fn correct_counterpart_name(&mut self, name: &str) -> bool {
        replace(&mut self.counterpart_name, name)
    }

    /// Corrects the grantee's ID after the client rejected it.
    pub fn correct_counterpart_id(&mut self, id: &str) -> bool {
        replace(&mut self.counterpart_id, id)
    }

    pub fn has_identity(&self) -> bool {
        self.subject_name.is_some() && self.subject_id.is_some()
    }

    pub fn has_counterpart(&self) -> bool {
        self.counterpart_name.is_some() && self.counterpart_id.is_some()
    }

    /// Client name, client ID, grantee name and grantee ID are all known.
    pub fn has_mandatory(&self) -> bool {
        self.has_identity() && self.has_counterpart()
    }

    /// Human-readable list of what is already known, for the prompt.
    pub fn known_summary(&self) -> Vec<String> {
        let mut known = Vec::new();
        if let Some(name) = &self.subject_name {
            known.push(format!("nome do cliente: {}", name));
        }
        if let Some(id) = &self.subject_id {
            known.push(format!("CPF do cliente: {}", format_id(id)));
        }
        if let Some(name) = &self.counterpart_name {
            known.push(format!("nome do representante: {}", name));
        }
        if let Some(id) = &self.counterpart_id {
            known.push(format!("CPF do representante: {}", format_id(id)));
        }
        if let Some(address) = &self.address {
            known.push(format!("endereço: {}", address));
        }
        if let Some(service) = &self.requested_service {
            known.push(format!("serviço desejado: {}", service));
        }
        known
    }
}

/// Everything the orchestrator knows about one user's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub display_name: String,
    pub phase: IntakePhase,
    pub topic: Topic,
    pub fields: CollectedFields,
    pub history: Vec<Turn>,
    pub created_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub last_exchange: Option<ExchangeRecord>,
    pub pending_document: Option<PendingDocumentConfirmation>,
    pub documents_received: BTreeSet<String>,
    pub escalation: EscalationState,
    pub human_handoff_requested: bool,
    pub counterpart_correction_requested: bool,
}

impl Session {
    pub fn new(user_id: UserId, display_name: &str, now: Timestamp) -> Self {
        Self {
            session_id: SessionId::new(),
            user_id,
            display_name: non_empty(display_name)
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            phase: IntakePhase::default(),
            topic: Topic::default(),
            fields: CollectedFields::default(),
            history: Vec::new(),
            created_at: now,
            last_activity_at: now,
            last_exchange: None,
            pending_document: None,
            documents_received: BTreeSet::new(),
            escalation: EscalationState::default(),
            human_handoff_requested: false,
            counterpart_correction_requested: false,
        }
    }

    /// Moves to `target`. Illegal moves are programming errors.
    pub fn transition_to(&mut self, target: IntakePhase) {
        let result = self.phase.advance(target);
        debug_assert!(result.is_ok(), "{:?}", result);
        if result.is_ok() {
            tracing::debug!(user_id = %self.user_id, phase = %self.phase, "phase changed");
        }
    }

    /// Updates the display name when the transport supplies a non-empty one.
    pub fn refresh_display_name(&mut self, display_name: &str) {
        if let Some(name) = non_empty(display_name) {
            self.display_name = name;
        }
    }

    /// Appends one exchange and trims the oldest turns to the phase cap.
    pub fn record_exchange(&mut self, question: &str, answer: &str, at: Timestamp) {
        self.history.push(Turn::user(question));
        self.history.push(Turn::assistant(answer));
        self.trim_history();
        self.last_exchange = Some(ExchangeRecord {
            question: question.to_string(),
            answer: answer.to_string(),
            at,
        });
    }

    pub fn trim_history(&mut self) {
        let cap = self.phase.history_cap();
        if self.history.len() > cap {
            let excess = self.history.len() - cap;
            self.history.drain(..excess);
        }
    }

    /// Lowercased text of the last `n` stored turns plus `current`.
    pub fn recent_text(&self, n: usize, current: &str) -> String {
        let start = self.history.len().saturating_sub(n);
        let mut text = self.history[start..]
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        text.push(' ');
        text.push_str(current);
        text.to_lowercase()
    }

    /// Time since the last inbound message, relative to `now`.
    pub fn idle_for(&self, now: Timestamp) -> std::time::Duration {
        now.elapsed_since(&self.last_activity_at)
    }
}
