//! Prompt assembly for completion calls.
//!
//! Builds the bounded message list sent to the completion service from a
//! session snapshot. Assembly is pure: phase, topic and known-field
//! directives are appended to the returned prompt only and never stored.

use serde::{Deserialize, Serialize};

use super::entity::format_id;
use super::escalation::HANDOFF_DIRECTIVE;
use super::phase::IntakePhase;
use super::session::{Session, TurnRole};
use super::topic::Topic;

/// Sampling temperature for conversational replies.
pub const REPLY_TEMPERATURE: f32 = 0.8;

const BREVITY: &str = "Responda SEMPRE em no máximo 2 frases curtas, nunca ultrapasse 2 linhas. Nunca repita perguntas já respondidas (nome, CPF, dados do representante, etc). Seja natural, empática, e nunca use listas, emojis ou termos técnicos sem explicação.";

/// Role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// A message in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }

    /// Rough token estimate, about four characters per token plus role overhead.
    pub fn estimate_tokens(&self) -> u32 {
        ((self.content.len() / 4) + 4) as u32
    }
}

/// A prompt ready to be sent, with metadata for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub messages: Vec<PromptMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// History entries dropped to respect the phase cap.
    pub truncated_count: usize,
    pub estimated_tokens: u32,
}

/// Builds prompts from sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextWindowManager;

impl ContextWindowManager {
    pub fn new() -> Self {
        Self
    }

    /// Persona preamble, always the first message.
    pub fn preamble(display_name: &str, phase: IntakePhase, topic: Topic) -> String {
        format!(
            "Você é SOPHIA, uma assistente jurídica HUMANA especializada em direito previdenciário brasileiro e também em documentos como procurações e contratos.\n\
             Trate o usuário pelo nome {nome} de forma calorosa e empática, como uma advogada real faria.\n\
             Seu objetivo é auxiliar com questões jurídicas variadas, incluindo benefícios do INSS, transferências de veículos, procurações e contratos.\n\
             \n\
             IMPORTANTE:\n\
             1. Nunca diga que é uma IA ou bot - você é uma assistente jurídica real que trabalha em um escritório de advocacia\n\
             2. Fale de forma natural, com frases curtas e diretas, evitando parecer robótica\n\
             3. Quando o cliente fornecer CPF ou outros dados pessoais, SEMPRE aceite normalmente, sem alertas de privacidade\n\
             4. Nunca diga que não pode receber dados pessoais - você é uma advogada e precisa desses dados\n\
             5. Faça uma pergunta por vez, não sobrecarregue o cliente com muitas perguntas\n\
             6. Mostre empatia e compreensão com a situação do cliente\n\
             7. Aceite documentos e dados pessoais sem questionar sua segurança\n\
             8. Use um tom conversacional e amigável, com algumas expressões coloquiais\n\
             9. MANTENHA O FOCO no tópico atual da conversa - não mude para outro assunto\n\
             10. Se o cliente fala sobre transferir um veículo, mantenha o foco nesse assunto específico\n\
             \n\
             Fase atual do atendimento: {fase}\n\
             Tópico atual da conversa: {topico}",
            nome = display_name,
            fase = phase,
            topico = topic
        )
    }

    /// Phase-specific instruction for the reply being generated.
    pub fn phase_directive(session: &Session) -> String {
        let fields = &session.fields;
        match session.phase {
            IntakePhase::Initial => format!(
                "Esta é a fase inicial do atendimento. Seja calorosa na recepção, apresente-se como SOPHIA, advogada especialista em questões jurídicas, e pergunte como pode ajudar. Não entre em muitos detalhes técnicos ainda. {}",
                BREVITY
            ),
            IntakePhase::Identification => format!(
                "Nesta fase, colete informações básicas do cliente como nome completo e depois CPF. Faça isso de forma natural na conversa, uma informação por vez. Se o cliente já forneceu essas informações, avance para entender a necessidade dele. Ao solicitar o CPF, acrescente uma mensagem de segurança: 'Seus dados estão seguros conosco. O CPF é necessário para preenchermos corretamente a procuração e darmos andamento ao seu atendimento jurídico.' {}",
                BREVITY
            ),
            IntakePhase::CollectingIdNumber => format!(
                "O cliente deve fornecer o CPF. Aceite normalmente sem questionar a privacidade. Trate o CPF como um dado necessário para o atendimento jurídico. Ao receber o CPF, informe que 'Seus dados estão seguros conosco. O CPF é necessário para preenchermos corretamente a procuração e darmos andamento ao seu atendimento jurídico.' {}",
                BREVITY
            ),
            IntakePhase::CollectingName => format!(
                "O cliente deve fornecer o nome completo. Continue o atendimento de forma natural. {}",
                BREVITY
            ),
            IntakePhase::CollectingCounterpartData | IntakePhase::CollectingPoaData => {
                match &fields.counterpart_name {
                    Some(name) if fields.counterpart_id.is_none() => format!(
                        "Já temos o nome do representante ({}), agora precisamos do CPF dele. Peça o CPF de forma clara e direta. {}",
                        name, BREVITY
                    ),
                    _ => format!(
                        "Estamos coletando os dados do representante para a procuração. Nesta etapa, precisamos do nome completo da pessoa que o cliente está autorizando a representá-lo. Se o cliente já informou o nome do representante, prossiga perguntando o CPF do representante. Mantenha o tom amigável e explique brevemente por que cada informação é necessária para a procuração. {}",
                        BREVITY
                    ),
                }
            }
            IntakePhase::ConfirmingData => format!(
                "Estamos confirmando os dados do representante com o cliente para ter certeza de que estão corretos antes de gerar a procuração. Os dados que temos são: - Nome do representante: {} - CPF do representante: {} Se o cliente confirmar, prossiga para a geração da procuração. Se o cliente não confirmar, peça para ele fornecer os dados corretos. {}",
                fields.counterpart_name.as_deref().unwrap_or("não informado"),
                fields
                    .counterpart_id
                    .as_deref()
                    .map(format_id)
                    .unwrap_or_else(|| "não informado".to_string()),
                BREVITY
            ),
            IntakePhase::UnderstandingNeed => match session.topic {
                Topic::VehicleTransfer => "O cliente está tratando de transferência de veículo e procuração para esse fim. Colete informações sobre os dados do veículo (modelo, placa, renavam), os dados da pessoa que receberá a procuração e a finalidade específica. Use o nome do cliente na conversa para personalizar.".to_string(),
                Topic::PensionBenefit => match &fields.counterpart_name {
                    Some(beneficiary) => format!(
                        "O cliente está tratando de um caso previdenciário relacionado a {} para {}. Confirme as informações que você já tem e, se faltar alguma, solicite de forma clara e direta. Se já tiver todas, sugira a geração de uma procuração para representação junto ao INSS.",
                        fields.requested_service.as_deref().unwrap_or("um benefício do INSS"),
                        beneficiary
                    ),
                    None => "O cliente já forneceu dados básicos e está tratando de previdência. Entenda qual é a necessidade específica: tipo de benefício previdenciário, situação atual, problemas enfrentados com o INSS. Se o cliente mencionar que é para outra pessoa, peça o nome completo e CPF dessa pessoa.".to_string(),
                },
                _ => "O cliente já forneceu dados básicos. Agora entenda qual é a necessidade específica e em qual área jurídica ele precisa de ajuda. Faça perguntas direcionadas para entender o contexto completo. Use o nome do cliente na conversa para personalizar.".to_string(),
            },
            IntakePhase::OfferingSolution => match session.topic {
                Topic::VehicleTransfer => "Agora que você entendeu os detalhes da transferência de veículo, explique como funciona a procuração para transferência de veículo, informe quais documentos serão necessários e ofereça explicitamente a geração da procuração. Explique que primeiro você vai gerar o documento PDF, o cliente vai verificá-lo e depois de confirmado você enviará o link para assinatura digital.".to_string(),
                Topic::PensionBenefit => format!(
                    "Agora que você entendeu a necessidade previdenciária do cliente relacionada a {} para {}, ofereça soluções práticas. Mencione a possibilidade de gerar uma procuração para representação junto ao INSS: primeiro o cliente receberá o PDF para verificação e, depois de confirmar, você enviará o link para assinatura digital.",
                    fields.requested_service.as_deref().unwrap_or("benefício previdenciário"),
                    fields.counterpart_name.as_deref().unwrap_or("seu familiar")
                ),
                _ => "Agora que você entendeu a necessidade do cliente, ofereça soluções práticas e oriente sobre os próximos passos. Mencione a possibilidade de gerar uma procuração adequada ao caso: primeiro você vai gerar o documento PDF, o cliente precisará verificá-lo e depois de confirmado você enviará o link para assinatura digital.".to_string(),
            },
            IntakePhase::Closing => format!(
                "O atendimento está sendo finalizado. Forneça orientações finais claras sobre o tema específico tratado ({}), resuma os próximos passos e deixe o cliente confiante. Mencione que estará disponível para dúvidas futuras.",
                session.topic
            ),
            IntakePhase::AwaitingDocumentConfirmation => "Você acabou de enviar um documento PDF para o cliente e está aguardando a confirmação para prosseguir com o processo de assinatura. Se o cliente tiver dúvidas sobre o documento, ofereça esclarecimentos. Se perguntar sobre os próximos passos, explique que após a confirmação você enviará o link para assinatura digital. Não introduza novos tópicos.".to_string(),
            IntakePhase::DocumentsReceived | IntakePhase::PowerOfAttorneySent => {
                let status = super::documents::DocumentStatus::for_session(session);
                format!(
                    "O cliente está enviando os documentos complementares. Documentos já recebidos: {}. Documentos pendentes: {}. Solicite os documentos faltantes de forma clara e direta, mantendo o tom amigável e profissional.",
                    if status.received.is_empty() {
                        "Nenhum ainda".to_string()
                    } else {
                        status.received.join(", ")
                    },
                    status.missing.join(", ")
                )
            }
        }
    }

    /// Instruction listing what the client already answered.
    pub fn known_fields_directive(session: &Session) -> Option<String> {
        let known = session.fields.known_summary();
        if known.is_empty() {
            return None;
        }
        Some(format!(
            "Não pergunte novamente o que o cliente já informou. Dados já conhecidos: {}.",
            known.join("; ")
        ))
    }

    /// Builds the prompt for `user_message` from the session as it stands.
    pub fn build_prompt(&self, session: &Session, user_message: &str) -> BuiltPrompt {
        let phase = session.phase;
        let cap = phase.history_cap();

        let mut history: Vec<PromptMessage> = session
            .history
            .iter()
            .map(|turn| match turn.role {
                TurnRole::User => PromptMessage::user(turn.content.clone()),
                TurnRole::Assistant => PromptMessage::assistant(turn.content.clone()),
            })
            .collect();
        history.push(PromptMessage::user(user_message));

        let truncated_count = history.len().saturating_sub(cap);
        history.drain(..truncated_count);

        let mut messages = Vec::with_capacity(history.len() + 5);
        messages.push(PromptMessage::system(Self::preamble(
            &session.display_name,
            phase,
            session.topic,
        )));
        messages.extend(history);

        messages.push(PromptMessage::system(Self::phase_directive(session)));
        if let Some(focus) = session.topic.focus_directive() {
            messages.push(PromptMessage::system(focus));
        }
        if let Some(known) = Self::known_fields_directive(session) {
            messages.push(PromptMessage::system(known));
        }
        if session.human_handoff_requested {
            messages.push(PromptMessage::system(HANDOFF_DIRECTIVE));
        }

        let estimated_tokens = messages.iter().map(PromptMessage::estimate_tokens).sum();

        BuiltPrompt {
            messages,
            max_tokens: phase.max_reply_tokens(),
            temperature: REPLY_TEMPERATURE,
            truncated_count,
            estimated_tokens,
        }
    }
}
