//! End-to-end intake conversations.
//!
//! These tests drive the orchestrator the way the transport does, one message
//! at a time, with in-memory storage and scripted model services:
//! 1. Technical questioning escalates to the hard lock and is released by a
//!    real introduction
//! 2. Identification and counterpart collection move the phase machine
//! 3. Repeated messages are answered from the dedup cache
//! 4. Turns for one user are serialized, different users run side by side

use futures::future::join_all;
use std::sync::Arc;

use intake_orchestrator::adapters::ai::DEFAULT_MOCK_REPLY;
use intake_orchestrator::adapters::{
    FileSessionStore, InMemorySessionStore, MockClassificationService, MockCompletionService,
};
use intake_orchestrator::application::{IntakeOrchestrator, IntakeSettings};
use intake_orchestrator::domain::foundation::{Timestamp, UserId};
use intake_orchestrator::domain::intake::{
    hard_lock_message, reconfirm_counterpart, redirect_message, IntakePhase, Session, Topic,
    CONFIRMED_GENERATE,
};
use intake_orchestrator::ports::SessionStore;
use tempfile::TempDir;

// =============================================================================
// Test Infrastructure
// =============================================================================

const DISPLAY: &str = "Ana";

struct Bot {
    store: InMemorySessionStore,
    completion: MockCompletionService,
    classifier: MockClassificationService,
    orchestrator: IntakeOrchestrator,
    user: UserId,
    clock: Timestamp,
}

impl Bot {
    fn new(classifier: MockClassificationService) -> Self {
        let store = InMemorySessionStore::new();
        let completion = MockCompletionService::new();
        let orchestrator = IntakeOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(completion.clone()),
            Arc::new(classifier.clone()),
            IntakeSettings::default(),
        );
        Self {
            store,
            completion,
            classifier,
            orchestrator,
            user: UserId::new("5511999990000@c.us").unwrap(),
            clock: Timestamp::now(),
        }
    }

    /// Sends `text` after `secs` seconds of silence.
    async fn say_after(&mut self, secs: i64, text: &str) -> String {
        self.clock = self.clock.plus_secs(secs);
        self.orchestrator
            .handle_message_at(&self.user, text, DISPLAY, self.clock)
            .await
            .unwrap()
            .unwrap()
    }

    async fn say(&mut self, text: &str) -> String {
        self.say_after(10, text).await
    }

    async fn session(&self) -> Session {
        self.store.load(&self.user).await.unwrap().unwrap()
    }
}

fn vehicle_questions() -> MockClassificationService {
    MockClassificationService::new().with_technical("transferência do veículo", "transferencia_veiculo")
}

const Q1: &str = "Qual o prazo legal para a transferência do veículo?";
const Q2: &str = "E qual a multa se o prazo da transferência do veículo passar?";
const Q3: &str = "E qual o valor da taxa da transferência do veículo?";

// =============================================================================
// Escalation
// =============================================================================

#[tokio::test]
async fn anonymous_technical_questions_end_in_hard_lock() {
    let mut bot = Bot::new(vehicle_questions());

    let first = bot.say(Q1).await;
    assert_eq!(first, DEFAULT_MOCK_REPLY);

    let second = bot.say(Q2).await;
    assert_eq!(second, redirect_message(DISPLAY));
    assert!(bot.session().await.escalation.soft_lock_active);

    let third = bot.say(Q3).await;
    assert_eq!(third, hard_lock_message(0, DISPLAY));

    let session = bot.session().await;
    assert!(session.escalation.hard_lock_active);
    assert_eq!(session.escalation.insistence_count, 1);
    // Only the first question reached the completion service
    assert_eq!(bot.completion.call_count(), 1);
}

#[tokio::test]
async fn place_names_in_questions_do_not_identify_the_user() {
    let mut bot = Bot::new(vehicle_questions());

    let first = bot
        .say("Qual o prazo legal para a transferência do veículo em São Paulo?")
        .await;
    assert_eq!(first, DEFAULT_MOCK_REPLY);

    let second = bot
        .say("E qual a multa se o prazo da transferência do veículo passar em São Paulo?")
        .await;
    assert_eq!(second, redirect_message(DISPLAY));

    let third = bot
        .say("E qual o valor da taxa da transferência do veículo em São Paulo?")
        .await;
    assert_eq!(third, hard_lock_message(0, DISPLAY));

    let session = bot.session().await;
    assert!(session.escalation.hard_lock_active);
    assert_eq!(session.fields.subject_name, None);
}

#[tokio::test]
async fn hard_lock_insists_on_anything_but_an_introduction() {
    let mut bot = Bot::new(vehicle_questions());
    bot.say(Q1).await;
    bot.say(Q2).await;
    bot.say(Q3).await;

    let reply = bot.say("Mas qual é a resposta?").await;
    assert_eq!(reply, hard_lock_message(1, DISPLAY));
    let reply = bot.say("Responde logo").await;
    assert_eq!(reply, hard_lock_message(2, DISPLAY));

    let session = bot.session().await;
    assert!(session.escalation.hard_lock_active);
    assert_eq!(session.escalation.insistence_count, 3);
}

#[tokio::test]
async fn introduction_with_real_situation_releases_hard_lock() {
    let mut bot = Bot::new(vehicle_questions());
    bot.say(Q1).await;
    bot.say(Q2).await;
    bot.say(Q3).await;

    bot.say(
        "Me chamo Carlos Souza e estou afastado porque sofri um acidente no trabalho mês passado",
    )
    .await;

    let session = bot.session().await;
    assert!(!session.escalation.hard_lock_active);
    assert!(!session.escalation.soft_lock_active);
    assert_eq!(session.escalation.technical_streak, 0.0);
    assert_eq!(session.fields.subject_name.as_deref(), Some("Carlos Souza"));
    assert_eq!(session.phase, IntakePhase::CollectingIdNumber);
    assert_eq!(session.topic, Topic::PensionBenefit);
}

#[tokio::test]
async fn asking_for_the_attorney_releases_hard_lock() {
    let mut bot = Bot::new(vehicle_questions());
    bot.say(Q1).await;
    bot.say(Q2).await;
    bot.say(Q3).await;

    bot.say("Prefiro falar com o advogado Gabriel diretamente").await;

    let session = bot.session().await;
    assert!(!session.escalation.hard_lock_active);
    assert!(session.human_handoff_requested);
}

// =============================================================================
// Phase machine
// =============================================================================

async fn identified_vehicle_client(bot: &mut Bot) {
    bot.say("Olá, preciso fazer uma transferência de veículo").await;
    bot.say("Meu nome é João Silva Santos").await;
    bot.say("123.456.789-09").await;
}

#[tokio::test]
async fn topic_then_name_then_id_asks_for_counterpart() {
    let mut bot = Bot::new(MockClassificationService::new());

    bot.say("Olá, preciso fazer uma transferência de veículo").await;
    assert_eq!(bot.session().await.topic, Topic::VehicleTransfer);

    bot.say("Meu nome é João Silva Santos").await;
    assert_eq!(bot.session().await.phase, IntakePhase::CollectingIdNumber);

    bot.say("123.456.789-09").await;
    let session = bot.session().await;
    assert_eq!(session.phase, IntakePhase::CollectingCounterpartData);
    assert_eq!(session.fields.subject_name.as_deref(), Some("João Silva Santos"));
    assert_eq!(session.fields.subject_id.as_deref(), Some("12345678909"));
}

#[tokio::test]
async fn late_counterpart_data_is_reconfirmed() {
    let mut bot = Bot::new(MockClassificationService::new());
    identified_vehicle_client(&mut bot).await;

    let reply = bot
        .say_after(180, "O representante é Pedro Alves Costa, CPF 111.222.333-44")
        .await;

    let session = bot.session().await;
    assert_eq!(session.phase, IntakePhase::ConfirmingData);
    assert_eq!(reply, reconfirm_counterpart("Pedro Alves Costa", "11122233344"));

    let reply = bot.say("Sim, correto").await;
    assert_eq!(reply, CONFIRMED_GENERATE);
    assert_eq!(bot.session().await.phase, IntakePhase::OfferingSolution);
}

#[tokio::test]
async fn prompt_counterpart_data_goes_straight_to_the_offer() {
    let mut bot = Bot::new(MockClassificationService::new());
    identified_vehicle_client(&mut bot).await;

    bot.say_after(20, "O representante é Pedro Alves Costa, CPF 111.222.333-44")
        .await;

    assert_eq!(bot.session().await.phase, IntakePhase::OfferingSolution);
}

#[tokio::test]
async fn rejected_confirmation_asks_for_corrected_counterpart() {
    let mut bot = Bot::new(MockClassificationService::new());
    identified_vehicle_client(&mut bot).await;
    bot.say_after(180, "O representante é Pedro Alves Costa, CPF 111.222.333-44")
        .await;

    bot.say("Não, está errado").await;
    let session = bot.session().await;
    assert_eq!(session.phase, IntakePhase::CollectingCounterpartData);
    assert!(session.counterpart_correction_requested);

    bot.say("O representante é Paulo Mendes Rocha, CPF 222.333.444-55").await;
    let session = bot.session().await;
    assert_eq!(
        session.fields.counterpart_name.as_deref(),
        Some("Paulo Mendes Rocha")
    );
    assert_eq!(session.fields.counterpart_id.as_deref(), Some("22233344455"));
    assert!(!session.counterpart_correction_requested);
    assert_eq!(session.phase, IntakePhase::OfferingSolution);
}

// =============================================================================
// Dedup and concurrency
// =============================================================================

#[tokio::test]
async fn repeated_message_replays_reply_without_classification() {
    let mut bot = Bot::new(MockClassificationService::new());

    let first = bot.say("Oi, tudo bem? Queria uma informação").await;
    let calls = bot.classifier.call_count();
    let stored = bot.session().await;

    let second = bot.say_after(5, "Oi, tudo bem? Queria uma informação").await;

    assert_eq!(first, second);
    assert_eq!(bot.classifier.call_count(), calls);
    assert_eq!(bot.completion.call_count(), 1);
    assert_eq!(bot.session().await, stored);
}

#[tokio::test]
async fn repeat_after_window_is_processed_again() {
    let mut bot = Bot::new(MockClassificationService::new());

    bot.say("Oi").await;
    let calls = bot.classifier.call_count();
    bot.say_after(61, "Oi").await;

    assert!(bot.classifier.call_count() > calls);
    assert_eq!(bot.session().await.history.len(), 4);
}

#[tokio::test]
async fn same_user_turns_are_serialized() {
    let bot = Bot::new(MockClassificationService::new());
    let at = Timestamp::now();

    let texts: Vec<String> = (0..5).map(|i| format!("mensagem número {}", i)).collect();

    let turns = texts
        .iter()
        .map(|text| bot.orchestrator.handle_message_at(&bot.user, text, DISPLAY, at));
    let replies = join_all(turns).await;

    assert!(replies.iter().all(|r| matches!(r, Ok(Some(_)))));
    assert_eq!(bot.session().await.history.len(), 10);
}

#[tokio::test]
async fn different_users_keep_separate_sessions() {
    let bot = Bot::new(MockClassificationService::new());
    let users: Vec<UserId> = (0..4)
        .map(|i| UserId::new(format!("user-{}", i)).unwrap())
        .collect();

    let turns = users
        .iter()
        .map(|u| bot.orchestrator.handle_inbound_message(u, "Oi", DISPLAY));
    join_all(turns).await;

    assert_eq!(bot.store.count().await.unwrap(), 4);
    for user in &users {
        let session = bot.store.load(user).await.unwrap().unwrap();
        assert_eq!(session.history.len(), 2);
    }
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn conversation_survives_restart_with_file_store() {
    let dir = TempDir::new().unwrap();
    let user = UserId::new("5511988887777@c.us").unwrap();
    let start = Timestamp::now();

    let orchestrator = |store: FileSessionStore| {
        IntakeOrchestrator::new(
            Arc::new(store),
            Arc::new(MockCompletionService::new()),
            Arc::new(MockClassificationService::new()),
            IntakeSettings::default(),
        )
    };

    let first = orchestrator(FileSessionStore::new(dir.path()));
    first
        .handle_message_at(&user, "Preciso fazer uma transferência de veículo", DISPLAY, start)
        .await
        .unwrap();
    first
        .handle_message_at(&user, "Meu nome é João Silva Santos", DISPLAY, start.plus_secs(10))
        .await
        .unwrap();
    drop(first);

    let second = orchestrator(FileSessionStore::new(dir.path()));
    second
        .handle_message_at(&user, "123.456.789-09", DISPLAY, start.plus_secs(20))
        .await
        .unwrap();

    let session = second.session_snapshot(&user).await.unwrap().unwrap();
    assert_eq!(session.phase, IntakePhase::CollectingCounterpartData);
    assert_eq!(session.history.len(), 6);
}
