//! Document kinds, required paperwork and the generation rule.

use serde::{Deserialize, Serialize};

use super::entity::format_id;
use super::phase::IntakePhase;
use super::session::Session;
use super::topic::Topic;

/// Kind of power of attorney to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    ProcuracaoVeiculo,
    ProcuracaoImovel,
    Aposentadoria,
    Auxilio,
    Bpc,
    Pensao,
    Revisao,
    Inss,
    Geral,
}

impl DocumentKind {
    /// Picks the kind from the topic and, for pension cases, the service label.
    pub fn resolve(topic: Topic, service: Option<&str>) -> Self {
        match topic {
            Topic::VehicleTransfer => Self::ProcuracaoVeiculo,
            Topic::PropertyTransfer => Self::ProcuracaoImovel,
            Topic::PensionBenefit => {
                let service = service.unwrap_or_default().to_lowercase();
                if service.contains("aposentadoria") {
                    Self::Aposentadoria
                } else if service.contains("auxílio") || service.contains("auxilio") {
                    Self::Auxilio
                } else if service.contains("bpc") || service.contains("loas") {
                    Self::Bpc
                } else if service.contains("pensão") || service.contains("pensao") {
                    Self::Pensao
                } else if service.contains("revisão") || service.contains("revisao") {
                    Self::Revisao
                } else {
                    Self::Inss
                }
            }
            Topic::General => Self::Geral,
        }
    }

    pub fn is_pension(&self) -> bool {
        matches!(
            self,
            Self::Aposentadoria | Self::Auxilio | Self::Bpc | Self::Pensao | Self::Revisao | Self::Inss
        )
    }
}

/// Complementary documents the client is asked to send for a document kind.
pub fn checklist_for(kind: DocumentKind) -> &'static [&'static str] {
    match kind {
        DocumentKind::Aposentadoria => &[
            "RG e CPF",
            "Carteira de trabalho ou carnês de contribuição",
            "Comprovante de residência dos últimos 5 anos",
            "Se rural: notas fiscais, bloco de produtor ou declaração do sindicato",
        ],
        DocumentKind::Bpc => &[
            "RG e CPF da pessoa com deficiência ou idosa",
            "Laudo médico atualizado (modelo INSS)",
            "Comprovante de renda familiar",
            "Declaração de pobreza, se não tiver comprovantes formais",
        ],
        DocumentKind::Revisao => &[
            "Documento de identificação",
            "Cópia do benefício atual",
            "Laudos, extratos e comprovantes de tempo de contribuição",
        ],
        DocumentKind::Auxilio => &[
            "Atestado médico com CID e período de afastamento",
            "Exames e laudos",
            "Comprovante de afastamento do trabalho",
        ],
        DocumentKind::Pensao => &[
            "Certidão de óbito",
            "Documentos dos dependentes (RG, certidão de nascimento)",
            "Comprovante de união estável ou casamento",
            "Comprovante de dependência financeira (extrato, IR)",
        ],
        DocumentKind::Inss => &[
            "RG e CPF",
            "Carteira de trabalho ou carnês de contribuição",
            "Extrato do CNIS",
            "Comprovante de residência recente",
        ],
        DocumentKind::ProcuracaoVeiculo | DocumentKind::ProcuracaoImovel | DocumentKind::Geral => &[],
    }
}

/// Documents that must arrive before the case is forwarded to the attorney.
pub fn required_documents(service: Option<&str>) -> &'static [&'static str] {
    let service = service.unwrap_or_default().to_lowercase();
    if service.contains("auxílio-doença") {
        &[
            "Atestado médico",
            "Laudo médico com CID",
            "Comprovante de residência",
            "Documento de identidade",
        ]
    } else if service.contains("transferência de veículo") {
        &[
            "Documento do veículo",
            "Comprovante de residência",
            "Documento de identidade",
        ]
    } else {
        &["Comprovante de residência", "Documento de identidade"]
    }
}

/// Received and missing documents for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub received: Vec<String>,
    pub missing: Vec<String>,
}

impl DocumentStatus {
    pub fn for_session(session: &Session) -> Self {
        let required = required_documents(session.fields.requested_service.as_deref());
        Self {
            received: session.documents_received.iter().cloned().collect(),
            missing: required
                .iter()
                .filter(|doc| !session.documents_received.contains(**doc))
                .map(|doc| doc.to_string())
                .collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Data handed to the document generator.
///
/// Missing values stay `None`; nothing is invented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentData {
    pub kind: DocumentKind,
    pub subject_name: Option<String>,
    /// Formatted as `XXX.XXX.XXX-XX`.
    pub subject_id: Option<String>,
    pub counterpart_name: Option<String>,
    pub counterpart_id: Option<String>,
    pub address: Option<String>,
    pub service: Option<String>,
    pub purpose: String,
}

impl DocumentData {
    pub fn for_session(session: &Session) -> Self {
        let fields = &session.fields;
        let kind = DocumentKind::resolve(session.topic, fields.requested_service.as_deref());
        let purpose = match session.topic {
            Topic::VehicleTransfer => "Transferência de propriedade de veículo".to_string(),
            Topic::PropertyTransfer => "Transferência de propriedade de imóvel".to_string(),
            Topic::PensionBenefit => format!(
                "Representação junto ao INSS para {}",
                fields
                    .requested_service
                    .as_deref()
                    .unwrap_or("benefícios previdenciários")
            ),
            Topic::General => fields
                .requested_service
                .clone()
                .unwrap_or_else(|| "Representação jurídica".to_string()),
        };

        Self {
            kind,
            subject_name: fields.subject_name.clone(),
            subject_id: fields.subject_id.as_deref().map(format_id),
            counterpart_name: fields.counterpart_name.clone(),
            counterpart_id: fields.counterpart_id.as_deref().map(format_id),
            address: fields.address.clone(),
            service: fields.requested_service.clone(),
            purpose,
        }
    }
}

fn mentions_generation_intent(recent: &str) -> bool {
    ["gerar procuração", "fazer procuração", "criar procuração"]
        .iter()
        .any(|k| recent.contains(k))
        || (recent.contains("documento") && (recent.contains("assinar") || recent.contains("gerar")))
}

/// True once the session holds enough data, and intent, to render the document.
pub fn should_generate(session: &Session) -> bool {
    if !matches!(
        session.phase,
        IntakePhase::OfferingSolution | IntakePhase::Closing
    ) {
        return false;
    }
    let fields = &session.fields;
    if !fields.has_identity() {
        return false;
    }

    let closing = session.phase == IntakePhase::Closing;
    let recent = session.recent_text(4, "");
    let service_known = fields.requested_service.is_some();

    match session.topic {
        Topic::VehicleTransfer | Topic::PropertyTransfer => {
            let has_grantee = fields.counterpart_name.is_some()
                || fields.counterpart_id.as_deref().map_or(false, |id| id.len() > 5);
            let has_address = fields.address.as_deref().map_or(false, |a| a.chars().count() > 5);
            has_grantee && has_address && (closing || mentions_generation_intent(&recent))
        }
        Topic::PensionBenefit => {
            service_known
                && (closing
                    || ["procuração", "documento", "representação"]
                        .iter()
                        .any(|k| recent.contains(k)))
        }
        Topic::General => {
            service_known
                && (closing
                    || ["procuração", "documento", "contrato"]
                        .iter()
                        .any(|k| recent.contains(k)))
        }
    }
}

const CONFIRMATION_WORDS: &[&str] = &[
    "ok",
    "sim",
    "confirmo",
    "quero",
    "pode",
    "continuar",
    "prosseguir",
    "prossiga",
    "concordo",
    "assinar",
    "assinatura",
    "entendi",
    "certo",
    "correto",
    "aprovado",
    "aprovo",
    "está bom",
    "tá bom",
    "perfeito",
    "está tudo certo",
    "autorizo",
    "está correto",
    "vamos lá",
];

const NEGATION_WORDS: &[&str] = &[
    "não",
    "nao",
    "incorreto",
    "errado",
    "mudar",
    "corrigir",
    "alterar",
    "refazer",
    "modificar",
    "está errado",
    "tem erro",
];

/// Word-aware containment: single words match whole tokens, phrases match as substrings.
fn contains_term(lower: &str, tokens: &[&str], term: &str) -> bool {
    if term.contains(' ') {
        lower.contains(term)
    } else {
        tokens.contains(&term)
    }
}

fn tokens(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// True when the text rejects or asks to change the document.
pub fn is_document_rejection(text: &str) -> bool {
    let lower = text.to_lowercase();
    let toks = tokens(&lower);
    NEGATION_WORDS.iter().any(|w| contains_term(&lower, &toks, w))
}

/// True when the text approves the document. Negations always win.
pub fn is_document_confirmation(text: &str) -> bool {
    if is_document_rejection(text) {
        return false;
    }
    let lower = text.to_lowercase();
    let toks = tokens(&lower);
    CONFIRMATION_WORDS
        .iter()
        .any(|w| contains_term(&lower, &toks, w))
}
