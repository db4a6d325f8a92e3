//! Classification Service Port - short yes/no and label judgements.
//!
//! Used by the escalation guard (is this a technical legal question, and on
//! which subject) and, optionally, as a topic fallback when the keyword
//! classifier finds nothing. Callers turn any failure into the conservative
//! default: not technical, no label.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::completion_service::ServiceError;

/// Port for text classification.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        task: ClassificationTask,
    ) -> Result<Classification, ServiceError>;
}

/// What to judge about a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTask {
    /// Is the message a technical legal question? Answers a flag.
    TechnicalQuestion,
    /// Short label for the legal subject of a technical question.
    TechnicalTopic,
    /// Intake topic label (`transferencia_veiculo`, `transferencia_imovel`,
    /// `previdenciario`, `geral`).
    SubjectTopic,
}

impl ClassificationTask {
    /// Completion token limit when the task is answered by a language model.
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::TechnicalQuestion => 5,
            Self::TechnicalTopic | Self::SubjectTopic => 10,
        }
    }
}

/// Result of a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Flag(bool),
    Label(Option<String>),
}

impl Classification {
    /// The flag value; labels count as `false`.
    pub fn as_flag(&self) -> bool {
        matches!(self, Self::Flag(true))
    }

    /// The label value; flags have none.
    pub fn into_label(self) -> Option<String> {
        match self {
            Self::Label(label) => label,
            Self::Flag(_) => None,
        }
    }
}
