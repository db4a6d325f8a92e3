//! IntakeOrchestrator - drives one user message through the intake pipeline.
//!
//! A turn runs in this order:
//!
//! 1. Dedup: an identical message inside the window replays the stored reply.
//! 2. Hard lock: containment or release.
//! 3. Escalation guard: technical questions, soft lock, streak decay.
//! 4. Pending document approval.
//! 5. Topic classification and the phase rules.
//! 6. Completion, when the rules ask for a generated reply.
//!
//! The turn mutates a working copy of the session. The copy is saved only
//! once a reply exists, so a failed completion leaves the stored session as
//! it was. Turns for the same user are serialized through a per-user lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::foundation::{StateMachine, Timestamp, UserId};
use crate::domain::intake::{
    is_document_confirmation, is_handoff_request, looks_like_id, should_generate,
    signals_service_change, ClientDataExtractor, ContextWindowManager, DedupPolicy, DocumentData,
    DocumentKind, DocumentStatus, EntityExtractor, EscalationGuard, GuardInput, GuardVerdict,
    HardLockOutcome, IdentitySnapshot, IntakePhase, PendingDocumentConfirmation, PhaseEngine,
    PhaseStep, Session, Topic, TopicClassifier, Turn, TurnInput, APOLOGY, DEFAULT_DEDUP_WINDOW,
};
use crate::ports::{
    Classification, ClassificationService, ClassificationTask, CompletionRequest,
    CompletionResponse, CompletionService, ServiceError, SessionStore, SessionStoreError,
};

/// Reply to a successful administrative reset.
pub const RESET_CONFIRMATION: &str = "Contexto reiniciado com sucesso!";

const RESET_COMMAND: &str = "!reset";

/// Minimum message length before the topic fallback asks the classifier.
const TOPIC_FALLBACK_MIN_CHARS: usize = 20;

/// History length after which a generated mention of "documento" closes the offer.
const AUTO_CLOSE_HISTORY: usize = 12;

/// Errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Session store error: {0}")]
    Storage(#[from] SessionStoreError),

    #[error("No session for user {0}")]
    SessionNotFound(UserId),
}

/// Tunable timings and switches for the orchestrator.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    /// Identical messages inside this window replay the stored reply.
    pub dedup_window: Duration,
    /// Gap after which complete counterpart data is re-confirmed.
    pub stale_after: Duration,
    /// Upper bound on every completion and classification call.
    pub call_timeout: Duration,
    /// Sessions idle for longer than this are evicted.
    pub idle_ttl: Duration,
    /// Ask the classifier for a topic when keywords find none.
    pub topic_fallback: bool,
    /// Key accepted by the `!reset` command. Disabled when absent.
    pub admin_key: Option<String>,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            stale_after: Duration::from_secs(120),
            call_timeout: Duration::from_secs(30),
            idle_ttl: Duration::from_secs(24 * 60 * 60),
            topic_fallback: false,
            admin_key: None,
        }
    }
}

/// Runs intake conversations on top of the session store and the model services.
pub struct IntakeOrchestrator {
    store: Arc<dyn SessionStore>,
    completion: Arc<dyn CompletionService>,
    classifier: Arc<dyn ClassificationService>,
    settings: IntakeSettings,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
    dedup: DedupPolicy,
    guard: EscalationGuard,
    engine: PhaseEngine,
    topics: TopicClassifier,
    entities: EntityExtractor,
    context: ContextWindowManager,
    client_data: ClientDataExtractor,
}

impl IntakeOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        completion: Arc<dyn CompletionService>,
        classifier: Arc<dyn ClassificationService>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            store,
            completion,
            classifier,
            dedup: DedupPolicy::new(settings.dedup_window),
            settings,
            locks: DashMap::new(),
            guard: EscalationGuard::new(),
            engine: PhaseEngine::new(),
            topics: TopicClassifier::new(),
            entities: EntityExtractor::new(),
            context: ContextWindowManager::new(),
            client_data: ClientDataExtractor::new(),
        }
    }

    pub fn settings(&self) -> &IntakeSettings {
        &self.settings
    }

    /// Entry point for the transport.
    ///
    /// Returns `Ok(None)` when there is nothing to answer (blank input).
    pub async fn handle_inbound_message(
        &self,
        user_id: &UserId,
        text: &str,
        display_name: &str,
    ) -> Result<Option<String>, IntakeError> {
        self.handle_message_at(user_id, text, display_name, Timestamp::now())
            .await
    }

    /// Same as [`handle_inbound_message`](Self::handle_inbound_message) with
    /// an explicit arrival time.
    pub async fn handle_message_at(
        &self,
        user_id: &UserId,
        text: &str,
        display_name: &str,
        now: Timestamp,
    ) -> Result<Option<String>, IntakeError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let lock = self.user_lock(user_id);
        let _turn = lock.lock().await;

        let stored = self.store.load(user_id).await?;
        if let Some(session) = &stored {
            if let Some(reply) = self.dedup.check(session, text, now) {
                debug!(user_id = %user_id, "duplicate message, replaying reply");
                return Ok(Some(reply));
            }
        }

        let mut session = match stored {
            Some(session) => session,
            None => {
                let session = Session::new(user_id.clone(), display_name, now);
                info!(
                    user_id = %user_id,
                    session_id = %session.session_id,
                    "starting intake session"
                );
                session
            }
        };
        let stale = now.elapsed_since(&session.last_activity_at) > self.settings.stale_after;
        session.last_activity_at = now;
        session.refresh_display_name(display_name);

        let reply = match self.run_turn(&mut session, text, stale).await {
            Some(reply) => reply,
            None => return Ok(Some(APOLOGY.to_string())),
        };

        session.record_exchange(text, &reply, now);
        self.store.save(&session).await?;
        debug!(
            user_id = %user_id,
            session_id = %session.session_id,
            phase = %session.phase,
            "turn committed"
        );
        Ok(Some(reply))
    }

    /// Produces the reply for one message, or `None` when the completion failed.
    async fn run_turn(&self, session: &mut Session, text: &str, stale: bool) -> Option<String> {
        let display_name = session.display_name.clone();

        match self
            .guard
            .check_hard_lock(&mut session.escalation, text, &display_name)
        {
            HardLockOutcome::Contained(reply) => return Some(reply),
            HardLockOutcome::Released {
                handoff_requested,
                introduced_name,
            } => {
                if handoff_requested {
                    session.human_handoff_requested = true;
                }
                // Phases that collect subject data capture the name themselves
                // and move the phase along with it.
                if let Some(name) = introduced_name {
                    if !session.phase.collects_subject_data() {
                        session.fields.fill_subject_name(&name);
                    }
                }
            }
            HardLockOutcome::NotLocked => {
                if is_handoff_request(text) {
                    info!(session_id = %session.session_id, "handoff to attorney requested");
                    session.human_handoff_requested = true;
                }
                if let GuardVerdict::Contain(reply) = self.guard_step(session, text).await {
                    return Some(reply);
                }
            }
        }

        if let Some(PhaseStep::Reply(reply)) = self.engine.document_response(session, text) {
            return Some(reply);
        }

        if session.phase.classifies_topic() {
            let detected = self.detect_topic(session, text).await;
            self.engine.apply_topic(session, detected, text);
        }

        match self.engine.step(session, TurnInput { text, stale }) {
            PhaseStep::Reply(reply) => Some(reply),
            PhaseStep::Generate { infer_service } => {
                if infer_service {
                    self.infer_service(session, text).await;
                }
                self.generate(session, text).await
            }
        }
    }

    async fn guard_step(&self, session: &mut Session, text: &str) -> GuardVerdict {
        let is_technical = self
            .classify(text, ClassificationTask::TechnicalQuestion)
            .await
            .map(|c| c.as_flag())
            .unwrap_or(false);
        let technical_topic = if is_technical {
            self.classify(text, ClassificationTask::TechnicalTopic)
                .await
                .and_then(Classification::into_label)
        } else {
            None
        };

        let identity = IdentitySnapshot {
            name_supplied: self.entities.subject_name(text, None).is_some(),
            id_supplied: looks_like_id(text),
            name_known: session.fields.subject_name.is_some(),
            id_known: session.fields.subject_id.is_some(),
        };
        let display_name = session.display_name.clone();
        let input = GuardInput {
            is_technical,
            technical_topic: technical_topic.as_deref(),
            service_change: signals_service_change(text),
            identity,
            display_name: &display_name,
        };
        self.guard.evaluate(&mut session.escalation, &input)
    }

    async fn detect_topic(&self, session: &Session, text: &str) -> Topic {
        let detected = self.topics.classify(text, session.topic);
        if detected != Topic::General
            || session.topic != Topic::General
            || !self.settings.topic_fallback
            || text.chars().count() < TOPIC_FALLBACK_MIN_CHARS
        {
            return detected;
        }

        self.classify(text, ClassificationTask::SubjectTopic)
            .await
            .and_then(Classification::into_label)
            .and_then(|label| Topic::from_label(&label))
            .unwrap_or(Topic::General)
    }

    /// Asks the completion service which service the client wants.
    async fn infer_service(&self, session: &mut Session, text: &str) {
        let mut probe = session.clone();
        probe.history.push(Turn::user(text));
        let prompt = self.client_data.service_prompt(&probe);

        let request = CompletionRequest::from_prompt(prompt).for_user(session.user_id.clone());
        let raw = match self.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "service inference failed");
                return;
            }
        };

        if let Some(service) = self.client_data.parse_service(&raw) {
            info!(user_id = %session.user_id, service = %service, "service inferred");
            session.fields.fill_requested_service(&service);
            if session.phase.can_transition_to(&IntakePhase::OfferingSolution) {
                session.transition_to(IntakePhase::OfferingSolution);
            }
        }
    }

    async fn generate(&self, session: &mut Session, text: &str) -> Option<String> {
        let prompt = self.context.build_prompt(session, text);
        if prompt.truncated_count > 0 {
            debug!(
                user_id = %session.user_id,
                dropped = prompt.truncated_count,
                "history truncated for prompt"
            );
        }

        let request = CompletionRequest::from_prompt(prompt).for_user(session.user_id.clone());
        let reply = match self.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(
                    user_id = %session.user_id,
                    session_id = %session.session_id,
                    error = %e,
                    "completion failed"
                );
                return None;
            }
        };

        if session.phase == IntakePhase::OfferingSolution {
            let lower = reply.to_lowercase();
            if lower.contains("procuração")
                || (lower.contains("documento") && session.history.len() > AUTO_CLOSE_HISTORY)
            {
                info!(session_id = %session.session_id, "offer accepted, closing");
                session.transition_to(IntakePhase::Closing);
            }
        }
        Some(reply)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ServiceError> {
        with_timeout(self.settings.call_timeout, self.completion.complete(request)).await
    }

    /// Classification with the conservative default on failure.
    async fn classify(&self, text: &str, task: ClassificationTask) -> Option<Classification> {
        match with_timeout(self.settings.call_timeout, self.classifier.classify(text, task)).await
        {
            Ok(classification) => Some(classification),
            Err(e) => {
                warn!(task = ?task, error = %e, "classification failed");
                None
            }
        }
    }

    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.locks.entry(user_id.clone()).or_default().clone()
    }

    /// Loads, mutates and saves a session under the user's lock.
    async fn update<T>(
        &self,
        user_id: &UserId,
        apply: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, IntakeError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut session = self.require(user_id).await?;
        let result = apply(&mut session);
        self.store.save(&session).await?;
        Ok(result)
    }

    async fn require(&self, user_id: &UserId) -> Result<Session, IntakeError> {
        self.store
            .load(user_id)
            .await?
            .ok_or_else(|| IntakeError::SessionNotFound(user_id.clone()))
    }

    // ------------------------------------------------------------------
    // Document generator queries and callbacks
    // ------------------------------------------------------------------

    pub async fn document_kind(&self, user_id: &UserId) -> Result<DocumentKind, IntakeError> {
        let session = self.require(user_id).await?;
        Ok(DocumentKind::resolve(
            session.topic,
            session.fields.requested_service.as_deref(),
        ))
    }

    pub async fn document_data(&self, user_id: &UserId) -> Result<DocumentData, IntakeError> {
        Ok(DocumentData::for_session(&self.require(user_id).await?))
    }

    /// False for unknown users.
    pub async fn should_generate_document(&self, user_id: &UserId) -> Result<bool, IntakeError> {
        Ok(self
            .store
            .load(user_id)
            .await?
            .map_or(false, |s| should_generate(&s)))
    }

    /// Marks the document as generated and closes the offer when the phase allows it.
    pub async fn mark_document_generated(&self, user_id: &UserId) -> Result<(), IntakeError> {
        self.update(user_id, |session| {
            session.fields.document_generated = true;
            if session.phase.can_transition_to(&IntakePhase::Closing) {
                session.transition_to(IntakePhase::Closing);
            }
        })
        .await
    }

    /// Records a generated document that waits for the client's approval.
    pub async fn await_document_confirmation(
        &self,
        user_id: &UserId,
        document_path: &str,
        subject_name: &str,
        kind: DocumentKind,
    ) -> Result<(), IntakeError> {
        let pending = PendingDocumentConfirmation {
            document_path: document_path.to_string(),
            subject_name: subject_name.to_string(),
            document_kind: kind,
            created_at: Timestamp::now(),
        };
        self.update(user_id, move |session| {
            session.pending_document = Some(pending);
            if session
                .phase
                .can_transition_to(&IntakePhase::AwaitingDocumentConfirmation)
            {
                session.transition_to(IntakePhase::AwaitingDocumentConfirmation);
            }
        })
        .await
    }

    pub async fn pending_document_confirmation(
        &self,
        user_id: &UserId,
    ) -> Result<Option<PendingDocumentConfirmation>, IntakeError> {
        Ok(self
            .store
            .load(user_id)
            .await?
            .and_then(|s| s.pending_document))
    }

    /// True when a document awaits approval and `text` approves it.
    pub async fn is_document_confirmation(
        &self,
        user_id: &UserId,
        text: &str,
    ) -> Result<bool, IntakeError> {
        let pending = self.pending_document_confirmation(user_id).await?;
        Ok(pending.is_some() && is_document_confirmation(text))
    }

    /// Clears the approval record once the document went out for signature.
    pub async fn complete_signature_request(&self, user_id: &UserId) -> Result<(), IntakeError> {
        self.update(user_id, |session| {
            session.pending_document = None;
            if session
                .phase
                .can_transition_to(&IntakePhase::PowerOfAttorneySent)
            {
                session.transition_to(IntakePhase::PowerOfAttorneySent);
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Document receipt
    // ------------------------------------------------------------------

    /// Registers a received document and returns the updated status.
    ///
    /// After a power of attorney went out the phase is kept, so the next
    /// message gets the hand-off reply once the list is complete.
    pub async fn record_document_received(
        &self,
        user_id: &UserId,
        label: &str,
    ) -> Result<DocumentStatus, IntakeError> {
        let label = label.trim().to_string();
        self.update(user_id, move |session| {
            session.documents_received.insert(label);
            if !matches!(
                session.phase,
                IntakePhase::DocumentsReceived
                    | IntakePhase::PowerOfAttorneySent
                    | IntakePhase::Closing
            ) {
                session.transition_to(IntakePhase::DocumentsReceived);
            }

            let status = DocumentStatus::for_session(session);
            if status.is_complete() && session.phase == IntakePhase::DocumentsReceived {
                info!(session_id = %session.session_id, "all required documents received");
                session.fields.forwarded_to_attorney = true;
                session.transition_to(IntakePhase::Closing);
            }
            status
        })
        .await
    }

    pub async fn all_required_documents_received(
        &self,
        user_id: &UserId,
    ) -> Result<bool, IntakeError> {
        Ok(self.document_status(user_id).await?.is_complete())
    }

    pub async fn document_status(&self, user_id: &UserId) -> Result<DocumentStatus, IntakeError> {
        Ok(DocumentStatus::for_session(&self.require(user_id).await?))
    }

    // ------------------------------------------------------------------
    // Client data extraction
    // ------------------------------------------------------------------

    /// Asks the completion service to read the client's name, ID and wanted
    /// service from the conversation. Only absent fields are filled.
    ///
    /// Returns the names of the fields that were filled. A failed call or an
    /// unreadable answer fills nothing.
    pub async fn extract_client_data(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<&'static str>, IntakeError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut session = self.require(user_id).await?;
        let prompt = self.client_data.client_data_prompt(&session);
        let request = CompletionRequest::from_prompt(prompt).for_user(user_id.clone());

        let raw = match self.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "client data extraction failed");
                return Ok(Vec::new());
            }
        };
        let data = match self.client_data.parse_client_data(&raw) {
            Ok(data) => data,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "unreadable client data");
                return Ok(Vec::new());
            }
        };

        let filled = self.client_data.apply(&mut session.fields, &data);
        if !filled.is_empty() {
            info!(user_id = %user_id, fields = ?filled, "client data extracted");
            self.store.save(&session).await?;
        }
        Ok(filled)
    }

    // ------------------------------------------------------------------
    // Administration and housekeeping
    // ------------------------------------------------------------------

    /// Wipes the user's session. The next message starts from scratch.
    pub async fn reset_session(&self, user_id: &UserId) -> Result<bool, IntakeError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let existed = self.store.delete(user_id).await?;
        info!(user_id = %user_id, existed, "session reset");
        Ok(existed)
    }

    /// Handles `!reset <key>`. Returns `None` for anything else, including a
    /// wrong key or a missing admin key, so the text goes through the normal turn.
    pub async fn handle_admin_command(
        &self,
        user_id: &UserId,
        text: &str,
    ) -> Result<Option<String>, IntakeError> {
        let key = match self.settings.admin_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => return Ok(None),
        };
        let mut parts = text.split_whitespace();
        if parts.next() != Some(RESET_COMMAND) || parts.next() != Some(key) {
            return Ok(None);
        }
        self.reset_session(user_id).await?;
        Ok(Some(RESET_CONFIRMATION.to_string()))
    }

    /// Removes sessions idle for longer than the configured TTL.
    pub async fn evict_idle(&self, now: Timestamp) -> Result<Vec<UserId>, IntakeError> {
        let cutoff = now.minus_secs(self.settings.idle_ttl.as_secs() as i64);
        let evicted = self.store.evict_idle(cutoff).await?;
        for user_id in &evicted {
            self.locks
                .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted idle sessions");
        }
        Ok(evicted)
    }

    /// Read-only copy of the stored session.
    pub async fn session_snapshot(&self, user_id: &UserId) -> Result<Option<Session>, IntakeError> {
        Ok(self.store.load(user_id).await?)
    }
}

async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::timeout(limit)),
    }
}
