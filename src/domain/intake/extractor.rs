//! Completion-assisted data extraction.
//!
//! Two auxiliary prompts run over the stored conversation: one asks for the
//! client's data as a JSON object, the other for the name of the wanted
//! service. Building the prompts and interpreting the raw answers is pure;
//! the orchestrator performs the calls.

use serde::Deserialize;
use thiserror::Error;

use super::context::{BuiltPrompt, ContextWindowManager, PromptMessage};
use super::entity::digits_only;
use super::session::{CollectedFields, Session, TurnRole};
use super::topic::Topic;

pub const EXTRACTION_TEMPERATURE: f32 = 0.2;
pub const EXTRACTION_MAX_TOKENS: u32 = 350;
pub const INFERENCE_TEMPERATURE: f32 = 0.3;
pub const INFERENCE_MAX_TOKENS: u32 = 100;

/// Turns of history sent with the service-inference prompt.
const INFERENCE_TURNS: usize = 6;

/// Longest answer still accepted as a service name.
const MAX_SERVICE_CHARS: usize = 80;

/// Errors interpreting an extraction answer.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no JSON object found in answer")]
    NoJson,

    #[error("malformed JSON object: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Client data reported by the completion service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientData {
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default, alias = "beneficio_desejado")]
    pub servico_desejado: Option<String>,
}

impl ClientData {
    pub fn is_empty(&self) -> bool {
        self.nome.is_none() && self.cpf.is_none() && self.servico_desejado.is_none()
    }
}

/// Locates the JSON object inside a free-form answer.
///
/// A fenced code block wins; otherwise the first balanced `{...}` span is used.
fn locate_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```") {
        let after = &raw[start + 3..];
        let body_start = after.find('\n').map_or(0, |i| i + 1);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let block = body[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    let open = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in raw[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[open..open + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn clean(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

fn history_messages(session: &Session, last: usize) -> Vec<PromptMessage> {
    let start = session.history.len().saturating_sub(last);
    session.history[start..]
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => PromptMessage::user(turn.content.clone()),
            TurnRole::Assistant => PromptMessage::assistant(turn.content.clone()),
        })
        .collect()
}

fn auxiliary_prompt(
    session: &Session,
    last: usize,
    request: String,
    max_tokens: u32,
    temperature: f32,
) -> BuiltPrompt {
    let mut messages = vec![PromptMessage::system(ContextWindowManager::preamble(
        &session.display_name,
        session.phase,
        session.topic,
    ))];
    let history = history_messages(session, last);
    let truncated_count = session.history.len() - history.len();
    messages.extend(history);
    messages.push(PromptMessage::user(request));
    let estimated_tokens = messages.iter().map(PromptMessage::estimate_tokens).sum();
    BuiltPrompt {
        messages,
        max_tokens,
        temperature,
        truncated_count,
        estimated_tokens,
    }
}

/// Builds and interprets the auxiliary extraction prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientDataExtractor;

impl ClientDataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Prompt asking for the client's name, ID and wanted service as JSON.
    pub fn client_data_prompt(&self, session: &Session) -> BuiltPrompt {
        let service_line = match session.topic {
            Topic::VehicleTransfer | Topic::PropertyTransfer => {
                "3) Finalidade específica da procuração de transferência"
            }
            Topic::PensionBenefit => {
                "3) Qual benefício previdenciário ou serviço relacionado ao INSS está buscando"
            }
            Topic::General => "3) Qual serviço jurídico está buscando",
        };
        let request = format!(
            "Por favor, ajude-me a preencher os dados do cliente para o sistema:\n\
             1) Nome completo do cliente (como aparece nos documentos)\n\
             2) CPF do cliente (apenas números)\n\
             {}\n\n\
             Responda APENAS em formato JSON como este exemplo:\n\
             {{\"nome\": \"João Silva\", \"cpf\": \"12345678901\", \"servico_desejado\": \"Transferência de veículo\"}}\n\
             Se alguma informação não estiver disponível, use null para o valor.",
            service_line
        );
        auxiliary_prompt(
            session,
            session.history.len(),
            request,
            EXTRACTION_MAX_TOKENS,
            EXTRACTION_TEMPERATURE,
        )
    }

    /// Parses the JSON object out of an extraction answer.
    pub fn parse_client_data(&self, raw: &str) -> Result<ClientData, ExtractionError> {
        let json = locate_json(raw).ok_or(ExtractionError::NoJson)?;
        Ok(serde_json::from_str(json)?)
    }

    /// Fills absent fields from extracted data. Returns the names of filled fields.
    ///
    /// IDs are kept only when they normalize to 11 digits.
    pub fn apply(&self, fields: &mut CollectedFields, data: &ClientData) -> Vec<&'static str> {
        let mut filled = Vec::new();
        if let Some(name) = clean(&data.nome) {
            if fields.fill_subject_name(name) {
                filled.push("subject_name");
            }
        }
        if let Some(id) = clean(&data.cpf) {
            let digits = digits_only(id);
            if digits.len() == 11 && fields.fill_subject_id(&digits) {
                filled.push("subject_id");
            }
        }
        if let Some(service) = clean(&data.servico_desejado) {
            if fields.fill_requested_service(service) {
                filled.push("requested_service");
            }
        }
        filled
    }

    /// Prompt asking for the name of the service the client wants.
    pub fn service_prompt(&self, session: &Session) -> BuiltPrompt {
        let question = match session.topic {
            Topic::VehicleTransfer => {
                "qual é o tipo específico de serviço relacionado a veículo que estou buscando? (transferência, procuração para venda, autorização para dirigir, etc.)"
            }
            Topic::PensionBenefit => {
                "qual é o principal benefício previdenciário ou serviço jurídico relacionado ao INSS que estou buscando?"
            }
            _ => "qual é o principal serviço jurídico que estou buscando?",
        };
        let request = format!(
            "Com base na nossa conversa até agora, {} Responda apenas com o nome do serviço, sem explicações adicionais.",
            question
        );
        auxiliary_prompt(
            session,
            INFERENCE_TURNS,
            request,
            INFERENCE_MAX_TOKENS,
            INFERENCE_TEMPERATURE,
        )
    }

    /// Interprets a service-inference answer. Empty or rambling answers yield `None`.
    pub fn parse_service(&self, raw: &str) -> Option<String> {
        let service = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
            .trim();
        if service.is_empty() || service.chars().count() > MAX_SERVICE_CHARS {
            return None;
        }
        let lower = service.to_lowercase();
        if ["não sei", "nao sei", "desconhecido", "nenhum", "null"]
            .iter()
            .any(|k| lower == *k)
        {
            return None;
        }
        Some(service.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};
    use crate::domain::intake::context::PromptRole;

    fn session() -> Session {
        Session::new(UserId::new("u-1").unwrap(), "Ana", Timestamp::now())
    }

    mod json {
        use super::*;

        #[test]
        fn bare_object() {
            let data = ClientDataExtractor::new()
                .parse_client_data(r#"{"nome": "João Silva", "cpf": "12345678909", "servico_desejado": null}"#)
                .unwrap();
            assert_eq!(data.nome.as_deref(), Some("João Silva"));
            assert_eq!(data.servico_desejado, None);
        }

        #[test]
        fn fenced_block_with_prose() {
            let raw = "Claro! Aqui estão os dados:\n```json\n{\"nome\": \"Ana Lima\"}\n```\nAlgo mais?";
            let data = ClientDataExtractor::new().parse_client_data(raw).unwrap();
            assert_eq!(data.nome.as_deref(), Some("Ana Lima"));
        }

        #[test]
        fn braces_inside_strings_do_not_close_object() {
            let raw = r#"Resultado: {"nome": "Ana {Lima}", "cpf": null} fim }"#;
            let data = ClientDataExtractor::new().parse_client_data(raw).unwrap();
            assert_eq!(data.nome.as_deref(), Some("Ana {Lima}"));
        }

        #[test]
        fn legacy_benefit_key_is_accepted() {
            let raw = r#"{"beneficio_desejado": "Aposentadoria"}"#;
            let data = ClientDataExtractor::new().parse_client_data(raw).unwrap();
            assert_eq!(data.servico_desejado.as_deref(), Some("Aposentadoria"));
        }

        #[test]
        fn prose_without_object_is_an_error() {
            let result = ClientDataExtractor::new().parse_client_data("Não encontrei dados.");
            assert!(matches!(result, Err(ExtractionError::NoJson)));
        }

        #[test]
        fn truncated_object_is_an_error() {
            let result = ClientDataExtractor::new().parse_client_data(r#"{"nome": "Ana"#);
            assert!(matches!(result, Err(ExtractionError::NoJson)));
        }
    }

    mod apply {
        use super::*;

        #[test]
        fn fills_only_absent_fields() {
            let mut fields = CollectedFields::default();
            fields.fill_subject_name("Carlos Souza");
            let data = ClientData {
                nome: Some("Outro Nome".to_string()),
                cpf: Some("123.456.789-09".to_string()),
                servico_desejado: Some("Auxílio-doença".to_string()),
            };
            let filled = ClientDataExtractor::new().apply(&mut fields, &data);

            assert_eq!(filled, vec!["subject_id", "requested_service"]);
            assert_eq!(fields.subject_name.as_deref(), Some("Carlos Souza"));
            assert_eq!(fields.subject_id.as_deref(), Some("12345678909"));
        }

        #[test]
        fn short_ids_and_null_strings_are_ignored() {
            let mut fields = CollectedFields::default();
            let data = ClientData {
                nome: Some("null".to_string()),
                cpf: Some("1234".to_string()),
                servico_desejado: None,
            };
            assert!(ClientDataExtractor::new().apply(&mut fields, &data).is_empty());
            assert_eq!(fields, CollectedFields::default());
        }
    }

    mod prompts {
        use super::*;

        #[test]
        fn client_data_prompt_ends_with_request() {
            let mut s = session();
            s.record_exchange("oi", "Olá!", Timestamp::now());
            let prompt = ClientDataExtractor::new().client_data_prompt(&s);

            assert_eq!(prompt.messages.len(), 4);
            assert_eq!(prompt.messages[0].role, PromptRole::System);
            let last = prompt.messages.last().unwrap();
            assert!(last.content.contains("servico_desejado"));
            assert_eq!(prompt.temperature, EXTRACTION_TEMPERATURE);
            assert_eq!(prompt.max_tokens, EXTRACTION_MAX_TOKENS);
        }

        #[test]
        fn service_prompt_uses_last_six_turns() {
            let mut s = session();
            s.phase = crate::domain::intake::phase::IntakePhase::UnderstandingNeed;
            for i in 0..6 {
                s.record_exchange(&format!("q{}", i), &format!("a{}", i), Timestamp::now());
            }
            let prompt = ClientDataExtractor::new().service_prompt(&s);

            assert_eq!(prompt.messages.len(), 1 + 6 + 1);
            assert_eq!(prompt.truncated_count, 6);
            assert_eq!(prompt.messages[1].content, "q3");
        }

        #[test]
        fn service_answer_is_trimmed() {
            let extractor = ClientDataExtractor::new();
            assert_eq!(
                extractor.parse_service("  \"Aposentadoria por idade\".\n"),
                Some("Aposentadoria por idade".to_string())
            );
            assert_eq!(extractor.parse_service("nenhum"), None);
            assert_eq!(extractor.parse_service(&"x".repeat(200)), None);
        }
    }
}
