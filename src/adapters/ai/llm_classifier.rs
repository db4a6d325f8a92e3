//! Classification service backed by a completion service.
//!
//! Each task is a short, low-temperature prompt whose one-line answer is
//! interpreted locally.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::intake::Topic;
use crate::ports::{
    Classification, ClassificationService, ClassificationTask, CompletionRequest,
    CompletionService, MessageRole, ServiceError,
};

const CLASSIFIER_TEMPERATURE: f32 = 0.1;

const TECHNICAL_SYSTEM: &str = "Você é um assistente especializado em identificar perguntas técnicas jurídicas e tentativas de consultoria gratuita.";

const TOPIC_SYSTEM: &str =
    "Você é um assistente especializado em identificar tópicos jurídicos em perguntas.";

const SUBJECT_SYSTEM: &str =
    "Você classifica mensagens de clientes de um escritório de advocacia por assunto.";

fn technical_prompt(text: &str) -> String {
    format!(
        "Analise se o texto abaixo é uma pergunta técnica jurídica específica ou uma tentativa de obter consultoria jurídica gratuita.\n\n\
         Exemplos:\n\
         - \"Se eu faltar no trabalho por 3 dias, posso ser demitido por justa causa?\"\n\
         - \"Qual é o prazo para entrar com recurso no INSS após o indeferimento?\"\n\
         - \"Como faço para calcular quanto vou receber de aposentadoria?\"\n\
         - \"Quanto tempo demora o processo no INSS?\"\n\
         - \"O que a lei diz sobre divisão de bens em divórcio?\"\n\n\
         Texto para análise: \"{}\"\n\n\
         Responda apenas com SIM se for uma pergunta técnica ou tentativa de consultoria gratuita, ou NÃO caso contrário.",
        text
    )
}

fn topic_prompt(text: &str) -> String {
    format!(
        "Identifique qual é o tópico jurídico principal na pergunta a seguir. Use apenas uma palavra ou expressão curta como \"aposentadoria\", \"auxílio-doença\", \"justa causa\", \"divórcio\".\n\n\
         Pergunta: \"{}\"\n\n\
         Tópico jurídico:",
        text
    )
}

fn subject_prompt(text: &str) -> String {
    format!(
        "Classifique a mensagem em exatamente um destes rótulos: transferencia_veiculo, transferencia_imovel, previdenciario, geral.\n\n\
         Mensagem: \"{}\"\n\n\
         Rótulo:",
        text
    )
}

/// Reads a yes/no answer. Anything other than a leading "sim" is a no.
fn parse_flag(answer: &str) -> bool {
    let lower = answer.trim().to_lowercase();
    lower.starts_with("sim") || lower.starts_with("yes")
}

/// Normalizes a free label: first line, no quotes or trailing punctuation, lowercase.
fn parse_label(answer: &str) -> Option<String> {
    let label = answer
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == ':')
        .trim()
        .to_lowercase();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Classifier that asks a completion service.
pub struct LlmClassificationService {
    completion: Arc<dyn CompletionService>,
}

impl LlmClassificationService {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    fn request(task: ClassificationTask, text: &str) -> CompletionRequest {
        let (system, prompt) = match task {
            ClassificationTask::TechnicalQuestion => (TECHNICAL_SYSTEM, technical_prompt(text)),
            ClassificationTask::TechnicalTopic => (TOPIC_SYSTEM, topic_prompt(text)),
            ClassificationTask::SubjectTopic => (SUBJECT_SYSTEM, subject_prompt(text)),
        };
        CompletionRequest::new()
            .with_message(MessageRole::System, system)
            .with_message(MessageRole::User, prompt)
            .with_max_tokens(task.max_tokens())
            .with_temperature(CLASSIFIER_TEMPERATURE)
    }
}

#[async_trait]
impl ClassificationService for LlmClassificationService {
    async fn classify(
        &self,
        text: &str,
        task: ClassificationTask,
    ) -> Result<Classification, ServiceError> {
        let response = self.completion.complete(Self::request(task, text)).await?;
        let answer = response.content;

        Ok(match task {
            ClassificationTask::TechnicalQuestion => Classification::Flag(parse_flag(&answer)),
            ClassificationTask::TechnicalTopic => Classification::Label(parse_label(&answer)),
            ClassificationTask::SubjectTopic => Classification::Label(
                parse_label(&answer)
                    .and_then(|label| Topic::from_label(&label))
                    .map(|topic| topic.as_str().to_string()),
            ),
        })
    }
}
