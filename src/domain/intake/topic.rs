//! Conversation topics and the keyword topic classifier.

use serde::{Deserialize, Serialize};

/// Subject-matter category of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    General,
    VehicleTransfer,
    PropertyTransfer,
    PensionBenefit,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::VehicleTransfer => "vehicle_transfer",
            Self::PropertyTransfer => "property_transfer",
            Self::PensionBenefit => "pension_benefit",
        }
    }

    /// Parses a label returned by the classification service.
    ///
    /// Accepts the wire names as well as the Portuguese labels the service
    /// tends to answer with.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        let label = label.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        match label {
            "general" | "geral" => Some(Self::General),
            "vehicle_transfer" | "transferencia_veiculo" | "veiculo" | "veículo" => {
                Some(Self::VehicleTransfer)
            }
            "property_transfer" | "transferencia_imovel" | "imovel" | "imóvel" => {
                Some(Self::PropertyTransfer)
            }
            "pension_benefit" | "previdenciario" | "previdenciário" | "inss" => {
                Some(Self::PensionBenefit)
            }
            _ => None,
        }
    }

    pub fn is_specific(&self) -> bool {
        !matches!(self, Self::General)
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::VehicleTransfer | Self::PropertyTransfer)
    }

    /// Service label pre-filled when the objective is inferred from the topic.
    pub fn default_service(&self) -> Option<&'static str> {
        match self {
            Self::VehicleTransfer => Some("Transferência de veículo"),
            Self::PropertyTransfer => Some("Transferência de imóvel"),
            Self::PensionBenefit | Self::General => None,
        }
    }

    /// Purpose line used by the document generator.
    pub fn purpose(&self) -> &'static str {
        match self {
            Self::VehicleTransfer => "Transferência de veículo",
            Self::PropertyTransfer => "Transferência de imóvel",
            Self::PensionBenefit => "Representação junto ao INSS",
            Self::General => "Representação legal",
        }
    }

    /// Directive keeping the assistant on the current subject.
    pub fn focus_directive(&self) -> Option<&'static str> {
        match self {
            Self::VehicleTransfer => Some(
                "Mantenha o foco exclusivamente na transferência de veículo e na procuração para esse fim. Não mude para assuntos previdenciários ou outros.",
            ),
            Self::PropertyTransfer => Some(
                "Mantenha o foco exclusivamente na transferência de imóvel e na procuração para esse fim. Não mude para outros assuntos.",
            ),
            Self::PensionBenefit => Some(
                "Mantenha o foco exclusivamente no caso previdenciário junto ao INSS. Não mude para outros assuntos.",
            ),
            Self::General => None,
        }
    }
}

impl Default for Topic {
    fn default() -> Self {
        Self::General
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ABANDONMENT_PHRASES: &[&str] = &[
    "mudar de assunto",
    "outro tema",
    "outra questão",
    "diferente",
    "esquece isso",
    "deixa pra lá",
    "outro problema",
];

const VEHICLE_KEYWORDS: &[&str] = &[
    "transferir carro",
    "transferência veículo",
    "transferência de veículo",
    "transferir veículo",
    "documentação veículo",
    "transferir meu carro",
    "procuração carro",
    "procuração para carro",
    "vender carro",
    "vender meu carro",
    "comprar carro",
    "procuração veicular",
    "detran",
    "transferência de propriedade",
    "documento de transferência",
    "procuração para transferir",
    "crv",
    "dut",
    "transferir moto",
    "transferência moto",
    "procuração para vender",
];

const PROPERTY_KEYWORDS: &[&str] = &[
    "transferir imóvel",
    "transferência imóvel",
    "transferência de imóvel",
    "procuração imóvel",
    "comprar casa",
    "vender casa",
    "comprar apartamento",
    "vender apartamento",
    "escritura",
    "registro de imóvel",
    "matrícula",
    "procuração para vender imóvel",
    "procuração para comprar imóvel",
];

const PENSION_KEYWORDS: &[&str] = &[
    "aposentadoria",
    "benefício",
    "inss",
    "pensão",
    "auxílio",
    "benefício por incapacidade",
    "bpc",
    "loas",
    "tempo de contribuição",
    "previdência",
    "previdenciário",
    "aposentar",
    "revisão",
    "perícia",
    "médica",
    "auxílio-doença",
    "aposentadoria por idade",
    "aposentadoria por tempo",
    "procuração para o inss",
    "procuração previdenciária",
    "afastado",
    "afastamento",
    "doença",
    "saúde",
    "atestado",
    "incapacidade",
];

/// Keyword-based topic detection.
///
/// Families are tested in a fixed order (vehicle, property, pension) and the
/// first family with a hit wins. A specific session topic is sticky: only an
/// explicit abandonment phrase brings it back to [`Topic::General`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicClassifier;

impl TopicClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classifies `text` given the topic currently held by the session.
    pub fn classify(&self, text: &str, current: Topic) -> Topic {
        let lower = text.to_lowercase();

        if current.is_specific() {
            if Self::signals_abandonment(&lower) {
                return Topic::General;
            }
            return current;
        }

        self.detect(&lower).unwrap_or(Topic::General)
    }

    /// Keyword detection without session stickiness. `lower` must be lowercase.
    pub fn detect(&self, lower: &str) -> Option<Topic> {
        let families = [
            (Topic::VehicleTransfer, VEHICLE_KEYWORDS),
            (Topic::PropertyTransfer, PROPERTY_KEYWORDS),
            (Topic::PensionBenefit, PENSION_KEYWORDS),
        ];
        for (topic, keywords) in families {
            if keywords.iter().any(|k| lower.contains(k)) {
                return Some(topic);
            }
        }

        if lower.contains("procuração") {
            if ["veículo", "carro", "moto"].iter().any(|k| lower.contains(k)) {
                return Some(Topic::VehicleTransfer);
            }
            if ["imóvel", "casa", "apartamento"].iter().any(|k| lower.contains(k)) {
                return Some(Topic::PropertyTransfer);
            }
            if ["inss", "benefício"].iter().any(|k| lower.contains(k)) {
                return Some(Topic::PensionBenefit);
            }
        }
        None
    }

    /// True when the text explicitly drops the current subject. `lower` must be lowercase.
    pub fn signals_abandonment(lower: &str) -> bool {
        ABANDONMENT_PHRASES.iter().any(|p| lower.contains(p))
    }
}
