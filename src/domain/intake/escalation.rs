//! Escalation guard against unqualified technical questioning.
//!
//! The guard is a small state machine layered over the intake phase:
//!
//! - `Idle`: technical questions are answered and accounted in a weighted streak.
//! - `SoftLocked`: same-topic technical questions get a rotating containment reply.
//!   Changing subject, or asking something non-technical, releases it.
//! - `HardLocked`: every message gets an escalating containment reply until the
//!   user asks for the attorney or introduces themselves with a real situation.
//!
//! Nothing on the ordinary path may clear the hard lock; only
//! [`EscalationGuard::check_hard_lock`] does.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::entity::EntityExtractor;
use crate::domain::foundation::StateMachine;

/// Streak threshold when nothing about the user's identity is known.
pub const ANONYMOUS_THRESHOLD: f32 = 2.0;

/// Streak threshold once a name or an ID is known. Also the hard-lock streak.
pub const IDENTIFIED_THRESHOLD: f32 = 3.0;

const SAME_TOPIC_WEIGHT: f32 = 1.5;
const NEW_TOPIC_WEIGHT: f32 = 1.0;

const HARD_LOCK_MESSAGES: [&str; 5] = [
    "{nome}, conforme te falei antes, não posso continuar com respostas técnicas sem entender o seu caso de verdade. Me diga seu nome completo e o que você está enfrentando, que eu te ajudo.",
    "Preciso do seu nome e da sua situação real para poder ajudar. Sem isso, não posso continuar com respostas técnicas.",
    "Se preferir um atendimento técnico direto, posso pedir para o Dr. Gabriel, nosso advogado sênior, entrar em contato com você. Quer isso?",
    "Ainda não recebi suas informações pessoais. Para respeitar nossos protocolos de segurança, não posso fornecer mais orientações técnicas sem conhecer seu caso real.",
    "Como você ainda não me contou sua situação real, essa conversa será encerrada por segurança, tudo bem? Quando quiser retomar com seus dados, estarei aqui.",
];

const SOFT_LOCK_MESSAGES: [&str; 5] = [
    "{nome}, preciso entender melhor seu caso específico antes de prosseguir. Me conta seu nome completo e a situação concreta que você está enfrentando?",
    "Para te ajudar de verdade, preciso saber mais sobre você e seu caso. O Dr. Gabriel, nosso advogado responsável, vai poder esclarecer todos esses detalhes assim que tivermos seus dados básicos.",
    "Entendo sua dúvida, mas pra te dar uma resposta precisa, preciso conhecer seu caso específico. Pode me contar qual é a situação concreta que você está enfrentando?",
    "Esses detalhes técnicos são melhor discutidos pelo Dr. Gabriel após entendermos seu caso. Vamos começar pelo básico?",
    "Como advogada, preciso conhecer seu caso antes de dar qualquer orientação técnica. Me conte sua situação, ok?",
];

const REDIRECT_MESSAGE: &str = "{nome}, por questões de segurança e precisão, não posso seguir com mais detalhes técnicos sem entender melhor sua situação.\n\nQuer que eu te ajude com um atendimento completo? O Dr. Gabriel, nosso advogado responsável, vai poder esclarecer todas essas dúvidas depois.\n\nMe conta um pouco sobre seu caso real?";

/// Instruction added to the prompt after the user asked for the attorney.
pub const HANDOFF_DIRECTIVE: &str = "O cliente pediu para falar diretamente com o Dr. Gabriel, nosso advogado sênior. Confirme que vai providenciar esse contato e peça apenas um breve resumo da situação para que ele possa se preparar. Não responda perguntas técnicas.";

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static escalation pattern compiles"))
        .collect()
}

static HANDOFF_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)(?:falar|conversar|atendimento|contato)[\s\w]+(?:com|pelo)[\s\w]+(?:gabriel|advogado|dr\.)",
        r"(?i)(?:quero|gostaria|prefiro)[\s\w]+(?:gabriel|advogado|dr\.)",
        r"(?i)(?:passa|transfere|transferir|encaminhar|encaminha)[\s\w]+(?:gabriel|advogado|dr\.)",
        r"(?i)(?:gabriel|advogado|dr\.)[\s\w]+(?:diretamente|direto|melhor|prefiro)",
        r"(?i)(?:sim|ok|pode|manda)[\s\w]?(?:gabriel|advogado)",
    ])
});

static SITUATION_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)(?:eu|meu|minha|me|comigo)[\s\w]+(?:estou|estive|fui|sou|tenho|preciso|quero|trabalh|empreg|contrat|problem)",
        r"(?i)(?:acidente|doença|doente|problema|situação|caso|empres|contrat|demit|aposent)",
        r"(?i)(?:semana|mês|ano|dia)[\s\w]+(?:passad|atrás|anterior)",
        r"(?i)(?:depois|então|quando|aconteceu|ocorreu)",
        r"(?i)(?:no|na|em)[\s\w]+(?:trabalho|empresa|hospital|acidente|casa|rua)",
    ])
});

static SERVICE_CHANGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)(?:preciso|quero|gostaria)[\s\w]+(?:ajuda|auxílio|assistência)[\s\w]+(?:com|para|sobre|em|outro)",
        r"(?i)(?:mudar|trocar|alterar)[\s\w]+(?:assunto|tópico|tema|serviço)",
        r"(?i)(?:outro|outra|nova|diferente)[\s\w]+(?:questão|situação|caso|problema|serviço|assunto)",
        r"(?i)(?:preciso|quero|como\s+faço)[\s\w]+(?:procuração|documento|contrato|divórcio|pensão|aposentadoria|transferir|transferência|vender|comprar)",
        r"(?i)(?:deixa|deixe)[\s\w]+(?:disso|esse\s+assunto|esse\s+tema|essa\s+questão)",
        r"(?i)(?:vamos|podemos)[\s\w]+(?:mudar|trocar|falar\s+de\s+outra\s+coisa|falar\s+sobre\s+outro\s+assunto)",
        r"(?i)esquece[\s\w]+isso",
        r"(?i)outra[\s\w]+pergunta",
        r"(?i)não[\s\w]+(?:isso|esse\s+assunto|essa\s+questão|esse\s+tema)",
        r"(?i)na\s+verdade[\s\w]+(?:quero|preciso|gostaria|vim\s+por)",
    ])
});

/// True when the user asks to be put in touch with the attorney.
pub fn is_handoff_request(text: &str) -> bool {
    if text.chars().count() < 10 {
        return false;
    }
    HANDOFF_PATTERNS.iter().any(|pattern| {
        pattern
            .find_iter(text)
            .any(|m| m.as_str().chars().count() > 5)
    })
}

/// True when the text narrates a concrete personal situation.
pub fn is_situation_description(text: &str) -> bool {
    if text.chars().count() < 50 {
        return false;
    }
    let families = SITUATION_MARKERS
        .iter()
        .filter(|pattern| pattern.is_match(text))
        .count();
    families >= 2
}

/// True when the user explicitly moves to another service or subject.
pub fn signals_service_change(text: &str) -> bool {
    SERVICE_CHANGE_PATTERNS.iter().any(|p| p.is_match(text))
}

fn personalize(template: &str, display_name: &str) -> String {
    template.replace("{nome}", display_name)
}

/// Hard-lock reply for the given insistence count, saturating at the last one.
pub fn hard_lock_message(insistence: u32, display_name: &str) -> String {
    let index = (insistence as usize).min(HARD_LOCK_MESSAGES.len() - 1);
    personalize(HARD_LOCK_MESSAGES[index], display_name)
}

/// Soft-lock reply for the given rotation level.
pub fn soft_lock_message(level: u32, display_name: &str) -> String {
    personalize(
        SOFT_LOCK_MESSAGES[level as usize % SOFT_LOCK_MESSAGES.len()],
        display_name,
    )
}

pub fn redirect_message(display_name: &str) -> String {
    personalize(REDIRECT_MESSAGE, display_name)
}

fn topics_related(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

/// Coarse escalation level derived from [`EscalationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Idle,
    SoftLocked,
    HardLocked,
}

impl StateMachine for EscalationLevel {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use EscalationLevel::*;
        match self {
            Idle => vec![SoftLocked, HardLocked],
            SoftLocked => vec![Idle, HardLocked],
            HardLocked => vec![Idle],
        }
    }
}

/// Per-session escalation bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationState {
    /// Weighted, decaying count of technical questions.
    pub technical_streak: f32,
    pub soft_lock_active: bool,
    /// Rotation index into the soft-lock replies.
    pub soft_lock_level: u32,
    pub hard_lock_active: bool,
    pub insistence_count: u32,
    pub last_technical_topic: Option<String>,
}

impl EscalationState {
    pub fn level(&self) -> EscalationLevel {
        if self.hard_lock_active {
            EscalationLevel::HardLocked
        } else if self.soft_lock_active {
            EscalationLevel::SoftLocked
        } else {
            EscalationLevel::Idle
        }
    }

    fn move_to(&mut self, target: EscalationLevel) {
        let current = self.level();
        debug_assert!(
            current.transition_to(target).is_ok(),
            "illegal escalation move {:?} -> {:?}",
            current,
            target
        );
        match target {
            EscalationLevel::Idle => {
                self.hard_lock_active = false;
                self.insistence_count = 0;
                self.clear_soft_lock();
            }
            EscalationLevel::SoftLocked => self.soft_lock_active = true,
            EscalationLevel::HardLocked => {
                self.soft_lock_active = true;
                self.hard_lock_active = true;
            }
        }
    }

    /// Releases the soft lock without touching the hard lock.
    fn clear_soft_lock(&mut self) {
        self.soft_lock_active = false;
        self.soft_lock_level = 0;
        self.technical_streak = 0.0;
        self.last_technical_topic = None;
    }

    /// Adds one technical question to the streak, weighting repeats of the same topic.
    fn accrue(&mut self, topic: Option<&str>) {
        let same_topic = match (topic, self.last_technical_topic.as_deref()) {
            (Some(current), Some(previous)) => topics_related(current, previous),
            _ => false,
        };
        self.technical_streak += if same_topic {
            SAME_TOPIC_WEIGHT
        } else {
            NEW_TOPIC_WEIGHT
        };
        if let Some(topic) = topic {
            self.last_technical_topic = Some(topic.to_string());
        }
    }
}

/// Who the user is.
///
/// `*_known` reflects fields already collected in the session and drives the
/// threshold and the hard-lock gate. `*_supplied` is what extraction found in
/// the current message and only resets the streak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub name_supplied: bool,
    pub id_supplied: bool,
    pub name_known: bool,
    pub id_known: bool,
}

impl IdentitySnapshot {
    /// No identity field has been collected yet.
    pub fn is_anonymous(&self) -> bool {
        !(self.name_known || self.id_known)
    }

    fn threshold(&self) -> f32 {
        if self.is_anonymous() {
            ANONYMOUS_THRESHOLD
        } else {
            IDENTIFIED_THRESHOLD
        }
    }
}

/// Everything the guard needs to judge one message outside the hard lock.
#[derive(Debug, Clone)]
pub struct GuardInput<'a> {
    pub is_technical: bool,
    pub technical_topic: Option<&'a str>,
    pub service_change: bool,
    pub identity: IdentitySnapshot,
    pub display_name: &'a str,
}

/// Result of evaluating a message against the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Proceed with ordinary phase processing.
    Continue,
    /// Short-circuit the turn with this containment reply.
    Contain(String),
}

/// Result of checking a hard-locked session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardLockOutcome {
    /// The session was not hard-locked.
    NotLocked,
    /// Still locked; reply with this text and stop.
    Contained(String),
    /// The lock was lifted and processing continues.
    Released {
        handoff_requested: bool,
        introduced_name: Option<String>,
    },
}

/// Evaluates messages against the escalation rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationGuard {
    extractor: EntityExtractor,
}

impl EscalationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hard-lock step: unlock on a handoff request or a named situation description.
    pub fn check_hard_lock(
        &self,
        state: &mut EscalationState,
        text: &str,
        display_name: &str,
    ) -> HardLockOutcome {
        if !state.hard_lock_active {
            return HardLockOutcome::NotLocked;
        }

        let handoff_requested = is_handoff_request(text);
        let introduced_name = self.extractor.subject_name(text, None);
        let introduced = introduced_name.is_some() && is_situation_description(text);

        if handoff_requested || introduced {
            info!(handoff_requested, introduced, "hard lock released");
            state.move_to(EscalationLevel::Idle);
            return HardLockOutcome::Released {
                handoff_requested,
                introduced_name: if introduced { introduced_name } else { None },
            };
        }

        let reply = hard_lock_message(state.insistence_count, display_name);
        state.insistence_count += 1;
        debug!(insistence = state.insistence_count, "hard lock holds");
        HardLockOutcome::Contained(reply)
    }

    /// Soft-lock, streak and decay steps for a session that is not hard-locked.
    pub fn evaluate(&self, state: &mut EscalationState, input: &GuardInput<'_>) -> GuardVerdict {
        if state.hard_lock_active {
            // check_hard_lock runs first and either contains or releases
            return GuardVerdict::Continue;
        }

        if state.soft_lock_active {
            let topic_changed = match (input.technical_topic, state.last_technical_topic.as_deref()) {
                (Some(current), Some(previous)) => !topics_related(current, previous),
                _ => false,
            };
            if input.service_change || topic_changed || !input.is_technical {
                debug!(
                    service_change = input.service_change,
                    topic_changed, "soft lock released"
                );
                state.move_to(EscalationLevel::Idle);
            }
        }

        if state.soft_lock_active {
            // Still locked: a technical question on the same topic.
            state.accrue(input.technical_topic);
            if state.technical_streak >= IDENTIFIED_THRESHOLD && input.identity.is_anonymous() {
                state.move_to(EscalationLevel::HardLocked);
                state.insistence_count = 1;
                info!(streak = state.technical_streak, "hard lock engaged");
                return GuardVerdict::Contain(hard_lock_message(0, input.display_name));
            }
            let reply = soft_lock_message(state.soft_lock_level, input.display_name);
            state.soft_lock_level += 1;
            return GuardVerdict::Contain(reply);
        }

        if input.is_technical {
            state.accrue(input.technical_topic);
            let threshold = input.identity.threshold();
            debug!(streak = state.technical_streak, threshold, "technical question");

            if state.technical_streak >= IDENTIFIED_THRESHOLD && input.identity.is_anonymous() {
                info!(streak = state.technical_streak, "hard lock engaged");
                state.move_to(EscalationLevel::HardLocked);
            }
            if state.technical_streak >= threshold {
                if !state.soft_lock_active {
                    state.move_to(EscalationLevel::SoftLocked);
                }
                return GuardVerdict::Contain(redirect_message(input.display_name));
            }
            return GuardVerdict::Continue;
        }

        state.technical_streak = (state.technical_streak - 1.0).max(0.0);
        if input.identity.name_supplied || input.identity.id_supplied {
            state.technical_streak = 0.0;
        }
        GuardVerdict::Continue
    }
}
