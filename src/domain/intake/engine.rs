//! Deterministic phase rules.
//!
//! [`PhaseEngine::step`] runs on a working copy of the session after the
//! escalation guard let the message through. It extracts fields, moves the
//! phase and either answers with a scripted reply or asks the caller to
//! generate one with the completion service.

use tracing::{debug, info};

use super::documents::{is_document_confirmation, is_document_rejection, DocumentStatus};
use super::entity::{digits_only, format_id, EntityExtractor};
use super::phase::IntakePhase;
use super::session::Session;
use super::topic::Topic;
use crate::domain::foundation::StateMachine;

/// Service label stored for sickness-benefit cases.
pub const SICKNESS_BENEFIT: &str = "Auxílio-doença";

/// Fixed apology returned when the completion service fails.
pub const APOLOGY: &str = "Desculpe, tive um problema técnico. Pode tentar novamente?";

/// Reply sent when every required document has arrived.
pub const ALL_DOCUMENTS_RECEIVED: &str = "Prontinho, recebi todos os documentos! Agora o advogado Gabriel, que é o responsável pelo seu atendimento, vai dar continuidade no seu caso. Fique tranquilo, vamos te manter informado sobre cada etapa do processo!";

/// Reply to an approved document.
pub const DOCUMENT_CONFIRMED: &str =
    "Ótimo! Vou prosseguir com o processo de assinatura e enviar o link em seguida.";

const SAFETY_NOTE: &str = "Seus dados estão seguros conosco. O CPF é necessário para preenchermos corretamente a procuração e darmos andamento ao seu atendimento jurídico.";

/// Outcome of the phase rules for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStep {
    /// Answer with this scripted text.
    Reply(String),
    /// Generate the answer with the completion service.
    Generate {
        /// Try to infer the wanted service from the conversation first.
        infer_service: bool,
    },
}

impl PhaseStep {
    fn generate() -> Self {
        Self::Generate {
            infer_service: false,
        }
    }
}

/// Per-message facts computed outside the engine.
#[derive(Debug, Clone, Copy)]
pub struct TurnInput<'a> {
    pub text: &'a str,
    /// The gap since the previous inbound message exceeded the stale threshold.
    pub stale: bool,
}

pub fn ask_name_after_id() -> String {
    format!(
        "Obrigada pelo CPF. Para continuar o atendimento, por favor me informe seu nome completo.\n\n{}",
        SAFETY_NOTE
    )
}

pub fn ask_counterpart(display_name: &str) -> String {
    format!(
        "Obrigada, {}. Para prosseguir com a procuração, preciso de alguns dados do representante. Por favor, me informe o nome completo da pessoa que você está autorizando a te representar.\n\n{}",
        display_name, SAFETY_NOTE
    )
}

pub fn ask_need(display_name: &str) -> String {
    format!(
        "Obrigada, {}. Agora que tenho seus dados, me conte com mais detalhes qual é sua situação e como posso ajudar com seu caso. Qual serviço você está buscando? Posso ajudar com procurações, transferências de veículos e imóveis ou benefícios do INSS.",
        display_name
    )
}

pub fn ask_counterpart_id(counterpart_name: &str) -> String {
    format!(
        "Obrigada. Agora preciso do CPF de {} para completar a procuração. Por favor, me informe o CPF.",
        counterpart_name
    )
}

pub fn reconfirm_counterpart(counterpart_name: &str, counterpart_id: &str) -> String {
    format!(
        "Recebi as informações. Apenas para confirmar: o nome da pessoa que você está autorizando é {}, CPF {}, correto?",
        counterpart_name,
        format_id(counterpart_id)
    )
}

pub const READY_TO_GENERATE: &str =
    "Perfeito! Com essas informações, vou gerar sua procuração. Aguarde um instante...";

pub const CONFIRMED_GENERATE: &str =
    "Ótimo! Vou gerar sua procuração agora mesmo. Aguarde um instante...";

pub const ASK_CORRECTION: &str = "Entendi. Por favor, me informe novamente os dados corretos do representante. Qual o nome completo e CPF da pessoa que você está autorizando?";

fn transfer_object(topic: Topic) -> &'static str {
    match topic {
        Topic::PropertyTransfer => "imóvel",
        _ => "veículo",
    }
}

fn poa_missing_items(session: &Session) -> Vec<&'static str> {
    let fields = &session.fields;
    let mut missing = Vec::new();
    if !fields.has_counterpart() {
        missing.push("nome e CPF da pessoa que receberá a procuração (outorgado)");
    }
    if fields.address.is_none() {
        missing.push(match session.topic {
            Topic::PropertyTransfer => "endereço completo do imóvel",
            _ => "endereço completo",
        });
    }
    missing
}

pub fn ask_poa_data(session: &Session) -> String {
    format!(
        "Para prosseguir com a procuração de transferência de {}, preciso dos seguintes dados: {}. Por favor, me informe esses detalhes para que eu possa gerar o documento.",
        transfer_object(session.topic),
        poa_missing_items(session).join(" e ")
    )
}

pub fn poa_complete(session: &Session) -> String {
    let name = session
        .fields
        .subject_name
        .as_deref()
        .unwrap_or(&session.display_name);
    format!(
        "Obrigada, {}! Agora tenho todos os dados necessários para gerar sua procuração para transferência de {}. Posso criar o documento para você assinar. Deseja que eu faça isso agora?",
        name,
        transfer_object(session.topic)
    )
}

pub fn poa_still_missing(session: &Session) -> String {
    let fields = &session.fields;
    let mut missing = Vec::new();
    if fields.counterpart_name.is_none() {
        missing.push("nome completo da pessoa que receberá a procuração");
    }
    if fields.address.is_none() {
        missing.push("endereço completo");
    }
    format!(
        "Ainda preciso dos seguintes dados para gerar a procuração: {}. Por favor, me informe.",
        missing.join(" e ")
    )
}

fn tokens(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_affirmative(text: &str) -> bool {
    let lower = text.to_lowercase();
    tokens(&lower).iter().any(|t| {
        matches!(
            *t,
            "sim" | "correto" | "isso" | "confirmo" | "exatamente" | "certo" | "tá"
        )
    })
}

fn is_negative(text: &str) -> bool {
    let lower = text.to_lowercase();
    tokens(&lower)
        .iter()
        .any(|t| matches!(*t, "não" | "nao" | "incorreto" | "errado" | "errada"))
}

fn mentions_pension_case(lower: &str) -> bool {
    ["auxílio-doença", "auxilio-doença", "auxilio doença", "auxílio doença", "afastado", "inss"]
        .iter()
        .any(|k| lower.contains(k))
}

fn mentions_sickness_benefit(lower: &str) -> bool {
    ["auxílio-doença", "auxilio-doença", "auxilio doença", "auxílio doença", "afastado"]
        .iter()
        .any(|k| lower.contains(k))
}

/// Applies the phase rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseEngine {
    extractor: EntityExtractor,
}

impl PhaseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly detected topic.
    ///
    /// A switch to the pension topic for an identified client whose recent
    /// turns talk about sickness pre-fills the service label.
    pub fn apply_topic(&self, session: &mut Session, detected: Topic, text: &str) {
        let previous = session.topic;
        if detected == previous {
            return;
        }
        info!(user_id = %session.user_id, from = %previous, to = %detected, "topic changed");
        session.topic = detected;

        if detected == Topic::PensionBenefit && session.fields.has_identity() {
            let recent = session.recent_text(3, text);
            if ["auxílio", "auxilio", "doença", "afastado"]
                .iter()
                .any(|k| recent.contains(k))
            {
                session.fields.fill_requested_service(SICKNESS_BENEFIT);
            }
        }
    }

    /// Handles the client's answer to a generated document awaiting approval.
    ///
    /// Returns `None` when the session is not waiting for one, or when the
    /// text is neither an approval nor a rejection.
    pub fn document_response(&self, session: &mut Session, text: &str) -> Option<PhaseStep> {
        if session.phase != IntakePhase::AwaitingDocumentConfirmation
            || session.pending_document.is_none()
        {
            return None;
        }

        if is_document_rejection(text) {
            info!(user_id = %session.user_id, "document rejected");
            session.pending_document = None;
            session.transition_to(IntakePhase::ConfirmingData);
            let reply = match (&session.fields.counterpart_name, &session.fields.counterpart_id) {
                (Some(name), Some(id)) => reconfirm_counterpart(name, id),
                _ => {
                    session.counterpart_correction_requested = true;
                    ASK_CORRECTION.to_string()
                }
            };
            return Some(PhaseStep::Reply(reply));
        }
        if is_document_confirmation(text) {
            info!(user_id = %session.user_id, "document approved");
            return Some(PhaseStep::Reply(DOCUMENT_CONFIRMED.to_string()));
        }
        None
    }

    /// Runs the rules for the session's current phase.
    pub fn step(&self, session: &mut Session, input: TurnInput<'_>) -> PhaseStep {
        let step = match session.phase {
            IntakePhase::Initial => {
                session.transition_to(IntakePhase::Identification);
                PhaseStep::generate()
            }
            IntakePhase::Identification
            | IntakePhase::CollectingIdNumber
            | IntakePhase::CollectingName
            | IntakePhase::UnderstandingNeed => self.subject_step(session, input.text),
            IntakePhase::CollectingCounterpartData | IntakePhase::CollectingPoaData => {
                self.counterpart_step(session, input.text)
            }
            IntakePhase::ConfirmingData => self.confirming_step(session, input.text),
            IntakePhase::DocumentsReceived | IntakePhase::PowerOfAttorneySent => {
                self.documents_step(session)
            }
            IntakePhase::OfferingSolution
            | IntakePhase::Closing
            | IntakePhase::AwaitingDocumentConfirmation => PhaseStep::generate(),
        };

        if session.phase.is_collecting()
            && session.fields.has_mandatory()
            && !session.counterpart_correction_requested
        {
            return self.route_complete(session, input.stale);
        }
        step
    }

    /// All four mandatory fields are known: re-confirm after a pause, otherwise offer.
    fn route_complete(&self, session: &mut Session, stale: bool) -> PhaseStep {
        let fields = &session.fields;
        let (name, id) = match (&fields.counterpart_name, &fields.counterpart_id) {
            (Some(name), Some(id)) => (name.clone(), id.clone()),
            _ => return PhaseStep::generate(),
        };

        if stale {
            debug!(user_id = %session.user_id, "stale input, confirming grantee data");
            session.transition_to(IntakePhase::ConfirmingData);
            PhaseStep::Reply(reconfirm_counterpart(&name, &id))
        } else {
            session.transition_to(IntakePhase::OfferingSolution);
            PhaseStep::Reply(READY_TO_GENERATE.to_string())
        }
    }

    fn objective_known(&self, session: &Session, text: &str) -> bool {
        if session.topic.is_specific() || session.fields.requested_service.is_some() {
            return true;
        }
        let recent = session.recent_text(4, text);
        ["procuração", "represent", "auxílio", "inss"]
            .iter()
            .any(|k| recent.contains(k))
    }

    /// Identity complete: go after the grantee when the goal is known, otherwise ask for it.
    fn route_identified(&self, session: &mut Session, text: &str) -> PhaseStep {
        if self.objective_known(session, text) {
            if let Some(service) = session.topic.default_service() {
                session.fields.fill_requested_service(service);
            }
            session.transition_to(IntakePhase::CollectingCounterpartData);
            PhaseStep::Reply(ask_counterpart(&session.display_name))
        } else {
            session.transition_to(IntakePhase::UnderstandingNeed);
            PhaseStep::Reply(ask_need(&session.display_name))
        }
    }

    fn capture_subject_id(&self, phase: IntakePhase, text: &str) -> Option<String> {
        let digits = digits_only(text);
        if digits.len() == 11 {
            return Some(digits);
        }
        if phase == IntakePhase::CollectingIdNumber {
            return self.extractor.subject_id(text);
        }
        None
    }

    fn subject_step(&self, session: &mut Session, text: &str) -> PhaseStep {
        let phase = session.phase;

        let mut name_captured = false;
        if session.fields.subject_name.is_none() {
            let other = session.fields.counterpart_name.clone();
            if let Some(name) = self.extractor.subject_name(text, other.as_deref()) {
                name_captured = session.fields.fill_subject_name(&name);
            }
        }

        let mut id_captured = false;
        if session.fields.subject_id.is_none() {
            if let Some(id) = self.capture_subject_id(phase, text) {
                id_captured = session.fields.fill_subject_id(&id);
            }
        }

        if name_captured || id_captured {
            debug!(user_id = %session.user_id, name_captured, id_captured, "subject data captured");
        }

        let name_known = session.fields.subject_name.is_some();
        let id_known = session.fields.subject_id.is_some();

        if (id_captured && name_known) || (name_captured && id_known) {
            return self.route_identified(session, text);
        }
        if id_captured && phase.can_transition_to(&IntakePhase::CollectingName) {
            session.transition_to(IntakePhase::CollectingName);
            return PhaseStep::Reply(ask_name_after_id());
        }
        if name_captured && phase.can_transition_to(&IntakePhase::CollectingIdNumber) {
            session.transition_to(IntakePhase::CollectingIdNumber);
            return PhaseStep::generate();
        }

        if phase == IntakePhase::UnderstandingNeed {
            return self.need_step(session, text);
        }
        PhaseStep::generate()
    }

    fn need_step(&self, session: &mut Session, text: &str) -> PhaseStep {
        let lower = text.to_lowercase();

        if mentions_pension_case(&lower) {
            if session.topic != Topic::PensionBenefit {
                info!(user_id = %session.user_id, "pension case detected");
                session.topic = Topic::PensionBenefit;
            }
            let subject = session.fields.subject_name.clone();
            let subject_id = session.fields.subject_id.clone();
            if let Some(name) = self.extractor.beneficiary_name(text, subject.as_deref()) {
                session.fields.fill_counterpart_name(&name);
            }
            if let Some(id) = self.extractor.counterpart_id(text, subject_id.as_deref()) {
                session.fields.fill_counterpart_id(&id);
            }
            if mentions_sickness_benefit(&lower) {
                session.fields.fill_requested_service(SICKNESS_BENEFIT);
            }
            if session.fields.requested_service.is_some() && session.fields.counterpart_name.is_some()
            {
                session.transition_to(IntakePhase::OfferingSolution);
            }
            return PhaseStep::generate();
        }

        if session.topic.is_transfer() && session.fields.has_identity() {
            self.extract_counterpart(session, text);
            if session.fields.has_counterpart() && session.fields.address.is_some() {
                session.transition_to(IntakePhase::OfferingSolution);
                return PhaseStep::generate();
            }
            session.transition_to(IntakePhase::CollectingPoaData);
            return PhaseStep::Reply(ask_poa_data(session));
        }

        if session.history.len() > 10 && session.fields.requested_service.is_none() {
            return PhaseStep::Generate {
                infer_service: true,
            };
        }
        PhaseStep::generate()
    }

    /// Opportunistic grantee extraction. Returns (name, id) captured flags.
    fn extract_counterpart(&self, session: &mut Session, text: &str) -> (bool, bool) {
        let address = self.extractor.address(text);
        // Street names look like person names; keep them out of the name search.
        let name_text = match &address {
            Some(a) => text.replace(a.as_str(), " "),
            None => text.to_string(),
        };

        let subject_name = session.fields.subject_name.clone();
        let subject_id = session.fields.subject_id.clone();
        let correcting = session.counterpart_correction_requested;
        let fields = &mut session.fields;

        let mut name_captured = false;
        if let Some(name) = self
            .extractor
            .counterpart_name(&name_text, subject_name.as_deref())
        {
            name_captured = if correcting {
                fields.correct_counterpart_name(&name)
            } else {
                fields.fill_counterpart_name(&name)
            };
        }

        let mut id_captured = false;
        if let Some(id) = self.extractor.counterpart_id(text, subject_id.as_deref()) {
            id_captured = if correcting {
                fields.correct_counterpart_id(&id)
            } else {
                fields.fill_counterpart_id(&id)
            };
        }

        if let Some(address) = address {
            fields.fill_address(&address);
        }
        (name_captured, id_captured)
    }

    fn counterpart_step(&self, session: &mut Session, text: &str) -> PhaseStep {
        let (name_captured, id_captured) = self.extract_counterpart(session, text);
        if session.counterpart_correction_requested
            && (name_captured || id_captured)
            && session.fields.has_counterpart()
        {
            session.counterpart_correction_requested = false;
        }

        if session.phase == IntakePhase::CollectingPoaData {
            if session.fields.counterpart_name.is_some() && session.fields.address.is_some() {
                session.transition_to(IntakePhase::OfferingSolution);
                return PhaseStep::Reply(poa_complete(session));
            }
            if session.fields.has_mandatory() {
                return PhaseStep::generate();
            }
        }

        let fields = &session.fields;
        if name_captured && fields.counterpart_id.is_none() {
            if let Some(name) = &fields.counterpart_name {
                return PhaseStep::Reply(ask_counterpart_id(name));
            }
        }
        if session.phase == IntakePhase::CollectingPoaData {
            return PhaseStep::Reply(poa_still_missing(session));
        }
        PhaseStep::generate()
    }

    fn confirming_step(&self, session: &mut Session, text: &str) -> PhaseStep {
        if is_negative(text) || !is_affirmative(text) {
            session.counterpart_correction_requested = true;
            session.transition_to(IntakePhase::CollectingCounterpartData);
            return PhaseStep::Reply(ASK_CORRECTION.to_string());
        }
        session.transition_to(IntakePhase::OfferingSolution);
        PhaseStep::Reply(CONFIRMED_GENERATE.to_string())
    }

    fn documents_step(&self, session: &mut Session) -> PhaseStep {
        let status = DocumentStatus::for_session(session);
        if !status.is_complete() {
            return PhaseStep::generate();
        }
        let was_sent = session.phase == IntakePhase::PowerOfAttorneySent;
        session.fields.forwarded_to_attorney = true;
        session.transition_to(IntakePhase::Closing);
        if was_sent {
            PhaseStep::Reply(ALL_DOCUMENTS_RECEIVED.to_string())
        } else {
            PhaseStep::generate()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};

    fn session_in(phase: IntakePhase) -> Session {
        let mut s = Session::new(UserId::new("u-1").unwrap(), "Ana", Timestamp::now());
        s.phase = phase;
        s
    }

    fn identified(phase: IntakePhase) -> Session {
        let mut s = session_in(phase);
        s.fields.fill_subject_name("João Silva Santos");
        s.fields.fill_subject_id("12345678909");
        s
    }

    fn fresh(text: &str) -> TurnInput<'_> {
        TurnInput { text, stale: false }
    }

    mod identification {
        use super::*;

        #[test]
        fn initial_moves_to_identification_and_generates() {
            let mut s = session_in(IntakePhase::Initial);
            let step = PhaseEngine::new().step(&mut s, fresh("Olá"));
            assert_eq!(s.phase, IntakePhase::Identification);
            assert_eq!(step, PhaseStep::Generate { infer_service: false });
        }

        #[test]
        fn name_only_asks_for_id() {
            let mut s = session_in(IntakePhase::Identification);
            let step = PhaseEngine::new().step(&mut s, fresh("Meu nome é João Silva Santos"));
            assert_eq!(s.phase, IntakePhase::CollectingIdNumber);
            assert_eq!(s.fields.subject_name.as_deref(), Some("João Silva Santos"));
            assert!(matches!(step, PhaseStep::Generate { .. }));
        }

        #[test]
        fn id_only_asks_for_name() {
            let mut s = session_in(IntakePhase::Identification);
            let step = PhaseEngine::new().step(&mut s, fresh("123.456.789-09"));
            assert_eq!(s.phase, IntakePhase::CollectingName);
            assert_eq!(step, PhaseStep::Reply(ask_name_after_id()));
        }

        #[test]
        fn id_with_known_goal_goes_to_counterpart() {
            let mut s = session_in(IntakePhase::CollectingIdNumber);
            s.topic = Topic::VehicleTransfer;
            s.fields.fill_subject_name("João Silva Santos");
            let step = PhaseEngine::new().step(&mut s, fresh("123.456.789-09"));

            assert_eq!(s.phase, IntakePhase::CollectingCounterpartData);
            assert_eq!(s.fields.subject_id.as_deref(), Some("12345678909"));
            assert_eq!(
                s.fields.requested_service.as_deref(),
                Some("Transferência de veículo")
            );
            assert_eq!(step, PhaseStep::Reply(ask_counterpart("Ana")));
        }

        #[test]
        fn id_with_unknown_goal_asks_need() {
            let mut s = session_in(IntakePhase::CollectingIdNumber);
            s.fields.fill_subject_name("João Silva Santos");
            let step = PhaseEngine::new().step(&mut s, fresh("CPF 123.456.789-09"));
            assert_eq!(s.phase, IntakePhase::UnderstandingNeed);
            assert_eq!(step, PhaseStep::Reply(ask_need("Ana")));
        }

        #[test]
        fn id_outside_id_phase_needs_eleven_digits() {
            let mut s = session_in(IntakePhase::Identification);
            PhaseEngine::new().step(&mut s, fresh("tenho 3 filhos e 2 carros"));
            assert_eq!(s.fields.subject_id, None);
        }
    }

    mod understanding_need {
        use super::*;

        #[test]
        fn sickness_mention_sets_pension_and_service() {
            let mut s = identified(IntakePhase::UnderstandingNeed);
            let step = PhaseEngine::new().step(
                &mut s,
                fresh("É para minha irmã, ela está afastado pelo INSS, o nome dela é Joana Prado"),
            );
            assert_eq!(s.topic, Topic::PensionBenefit);
            assert_eq!(s.fields.requested_service.as_deref(), Some(SICKNESS_BENEFIT));
            assert_eq!(s.fields.counterpart_name.as_deref(), Some("Joana Prado"));
            assert_eq!(s.phase, IntakePhase::OfferingSolution);
            assert!(matches!(step, PhaseStep::Generate { .. }));
        }

        #[test]
        fn transfer_without_data_asks_for_poa_data() {
            let mut s = identified(IntakePhase::UnderstandingNeed);
            s.topic = Topic::VehicleTransfer;
            let step = PhaseEngine::new().step(&mut s, fresh("quero transferir"));
            assert_eq!(s.phase, IntakePhase::CollectingPoaData);
            match step {
                PhaseStep::Reply(text) => {
                    assert!(text.contains("transferência de veículo"));
                    assert!(text.contains("(outorgado) e endereço completo"));
                }
                other => panic!("expected scripted reply, got {:?}", other),
            }
        }

        #[test]
        fn long_conversation_without_service_requests_inference() {
            let mut s = identified(IntakePhase::UnderstandingNeed);
            for i in 0..6 {
                s.record_exchange(&format!("pergunta {}", i), "resposta", Timestamp::now());
            }
            let step = PhaseEngine::new().step(&mut s, fresh("então, é isso"));
            assert_eq!(step, PhaseStep::Generate { infer_service: true });
        }
    }

    mod counterpart {
        use super::*;

        #[test]
        fn name_without_id_asks_for_id() {
            let mut s = identified(IntakePhase::CollectingCounterpartData);
            let step = PhaseEngine::new().step(&mut s, fresh("O nome é Pedro Alves Costa"));
            assert_eq!(step, PhaseStep::Reply(ask_counterpart_id("Pedro Alves Costa")));
        }

        #[test]
        fn complete_data_after_pause_is_confirmed() {
            let mut s = identified(IntakePhase::CollectingCounterpartData);
            let step = PhaseEngine::new().step(
                &mut s,
                TurnInput {
                    text: "O representante é Pedro Alves Costa, CPF 111.222.333-44",
                    stale: true,
                },
            );
            assert_eq!(s.phase, IntakePhase::ConfirmingData);
            assert_eq!(
                step,
                PhaseStep::Reply(reconfirm_counterpart("Pedro Alves Costa", "11122233344"))
            );
        }

        #[test]
        fn complete_data_without_pause_offers() {
            let mut s = identified(IntakePhase::CollectingCounterpartData);
            let step = PhaseEngine::new().step(
                &mut s,
                fresh("O representante é Pedro Alves Costa, CPF 111.222.333-44"),
            );
            assert_eq!(s.phase, IntakePhase::OfferingSolution);
            assert_eq!(step, PhaseStep::Reply(READY_TO_GENERATE.to_string()));
        }

        #[test]
        fn subject_id_is_not_taken_as_grantee_id() {
            let mut s = identified(IntakePhase::CollectingCounterpartData);
            PhaseEngine::new().step(&mut s, fresh("meu cpf é 123.456.789-09"));
            assert_eq!(s.fields.counterpart_id, None);
        }

        #[test]
        fn street_is_not_taken_as_grantee_name() {
            let mut s = identified(IntakePhase::CollectingPoaData);
            s.topic = Topic::VehicleTransfer;
            let step = PhaseEngine::new().step(&mut s, fresh("Endereço: Rua das Flores 120"));
            assert_eq!(s.fields.counterpart_name, None);
            assert_eq!(s.fields.address.as_deref(), Some("Rua das Flores 120"));
            assert_eq!(step, PhaseStep::Reply(poa_still_missing(&s)));
        }

        #[test]
        fn poa_data_complete_offers_document() {
            let mut s = identified(IntakePhase::CollectingPoaData);
            s.topic = Topic::PropertyTransfer;
            s.fields.fill_address("Rua das Flores 120");
            let step = PhaseEngine::new().step(&mut s, fresh("O outorgado é Pedro Alves Costa"));
            assert_eq!(s.phase, IntakePhase::OfferingSolution);
            match step {
                PhaseStep::Reply(text) => assert!(text.starts_with("Obrigada, João Silva Santos!")),
                other => panic!("expected scripted reply, got {:?}", other),
            }
        }
    }

    mod confirming {
        use super::*;

        fn confirming() -> Session {
            let mut s = identified(IntakePhase::ConfirmingData);
            s.fields.fill_counterpart_name("Pedro Alves Costa");
            s.fields.fill_counterpart_id("11122233344");
            s
        }

        #[test]
        fn affirmative_offers() {
            let mut s = confirming();
            let step = PhaseEngine::new().step(&mut s, fresh("Sim, correto"));
            assert_eq!(s.phase, IntakePhase::OfferingSolution);
            assert_eq!(step, PhaseStep::Reply(CONFIRMED_GENERATE.to_string()));
        }

        #[test]
        fn incorrect_is_a_negation() {
            let mut s = confirming();
            let step = PhaseEngine::new().step(&mut s, fresh("incorreto"));
            assert_eq!(s.phase, IntakePhase::CollectingCounterpartData);
            assert!(s.counterpart_correction_requested);
            assert_eq!(step, PhaseStep::Reply(ASK_CORRECTION.to_string()));
        }

        #[test]
        fn correction_overwrites_grantee() {
            let mut s = confirming();
            let engine = PhaseEngine::new();
            engine.step(&mut s, fresh("não"));
            engine.step(
                &mut s,
                fresh("O representante é Paulo Mendes Rocha, CPF 999.888.777-66"),
            );
            assert_eq!(s.fields.counterpart_name.as_deref(), Some("Paulo Mendes Rocha"));
            assert_eq!(s.fields.counterpart_id.as_deref(), Some("99988877766"));
            assert!(!s.counterpart_correction_requested);
        }
    }

    mod document_answers {
        use super::*;
        use crate::domain::intake::documents::DocumentKind;
        use crate::domain::intake::session::PendingDocumentConfirmation;

        fn awaiting() -> Session {
            let mut s = identified(IntakePhase::AwaitingDocumentConfirmation);
            s.fields.fill_counterpart_name("Pedro Alves Costa");
            s.fields.fill_counterpart_id("11122233344");
            s.pending_document = Some(PendingDocumentConfirmation {
                document_path: "/tmp/procuracao.pdf".to_string(),
                subject_name: "João Silva Santos".to_string(),
                document_kind: DocumentKind::ProcuracaoVeiculo,
                created_at: Timestamp::now(),
            });
            s
        }

        #[test]
        fn approval_keeps_pending_record() {
            let mut s = awaiting();
            let step = PhaseEngine::new().document_response(&mut s, "Está correto, pode seguir");
            assert_eq!(step, Some(PhaseStep::Reply(DOCUMENT_CONFIRMED.to_string())));
            assert!(s.pending_document.is_some());
            assert_eq!(s.phase, IntakePhase::AwaitingDocumentConfirmation);
        }

        #[test]
        fn rejection_clears_pending_and_reconfirms() {
            let mut s = awaiting();
            let step = PhaseEngine::new().document_response(&mut s, "Não, o nome está errado");
            assert_eq!(
                step,
                Some(PhaseStep::Reply(reconfirm_counterpart("Pedro Alves Costa", "11122233344")))
            );
            assert!(s.pending_document.is_none());
            assert_eq!(s.phase, IntakePhase::ConfirmingData);
        }

        #[test]
        fn unrelated_text_falls_through() {
            let mut s = awaiting();
            assert_eq!(PhaseEngine::new().document_response(&mut s, "bom dia"), None);
        }

        #[test]
        fn other_phases_are_ignored() {
            let mut s = identified(IntakePhase::OfferingSolution);
            assert_eq!(PhaseEngine::new().document_response(&mut s, "sim"), None);
        }
    }

    mod topics {
        use super::*;

        #[test]
        fn pension_switch_prefills_sickness_benefit() {
            let mut s = identified(IntakePhase::UnderstandingNeed);
            PhaseEngine::new().apply_topic(&mut s, Topic::PensionBenefit, "estou com uma doença");
            assert_eq!(s.topic, Topic::PensionBenefit);
            assert_eq!(s.fields.requested_service.as_deref(), Some(SICKNESS_BENEFIT));
        }

        #[test]
        fn pension_switch_without_identity_keeps_service_empty() {
            let mut s = session_in(IntakePhase::Identification);
            PhaseEngine::new().apply_topic(&mut s, Topic::PensionBenefit, "estou com uma doença");
            assert_eq!(s.fields.requested_service, None);
        }
    }

    mod documents {
        use super::*;

        #[test]
        fn all_documents_after_signature_closes_with_handoff() {
            let mut s = identified(IntakePhase::PowerOfAttorneySent);
            s.documents_received.insert("Comprovante de residência".to_string());
            s.documents_received.insert("Documento de identidade".to_string());
            let step = PhaseEngine::new().step(&mut s, fresh("enviei tudo"));
            assert_eq!(s.phase, IntakePhase::Closing);
            assert!(s.fields.forwarded_to_attorney);
            assert_eq!(step, PhaseStep::Reply(ALL_DOCUMENTS_RECEIVED.to_string()));
        }

        #[test]
        fn missing_documents_keep_phase() {
            let mut s = identified(IntakePhase::PowerOfAttorneySent);
            let step = PhaseEngine::new().step(&mut s, fresh("oi"));
            assert_eq!(s.phase, IntakePhase::PowerOfAttorneySent);
            assert!(matches!(step, PhaseStep::Generate { .. }));
        }
    }
}
