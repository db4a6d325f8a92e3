//! Intake phases.
//!
//! The phase is the position of a session in the intake workflow. Exactly one
//! phase is active at a time and every change goes through [`StateMachine`].

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Current position of a session in the intake workflow.
///
/// The main path is
/// `Initial` → `Identification` → `CollectingIdNumber`/`CollectingName` →
/// `UnderstandingNeed` → `CollectingCounterpartData` → `ConfirmingData` →
/// `OfferingSolution` → `Closing`, with the document phases reachable from
/// anywhere once a document has been produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakePhase {
    /// First contact, greet and ask how to help.
    Initial,

    /// Asking for the client's basic identity.
    Identification,

    /// Name known, waiting for the national ID.
    CollectingIdNumber,

    /// National ID known, waiting for the full name.
    CollectingName,

    /// Identity known, discovering which service is wanted.
    UnderstandingNeed,

    /// Collecting the grantee's name and national ID.
    CollectingCounterpartData,

    /// Collecting remaining power-of-attorney data (grantee, address).
    CollectingPoaData,

    /// Re-confirming grantee data received after a pause.
    ConfirmingData,

    /// Everything needed is known, offering the document.
    OfferingSolution,

    /// Wrapping up the conversation.
    Closing,

    /// A generated document was sent, waiting for the client to approve it.
    AwaitingDocumentConfirmation,

    /// The client is sending complementary documents.
    DocumentsReceived,

    /// The signature request was sent.
    PowerOfAttorneySent,
}

impl IntakePhase {
    /// All phases, in workflow order.
    pub const ALL: [IntakePhase; 13] = [
        Self::Initial,
        Self::Identification,
        Self::CollectingIdNumber,
        Self::CollectingName,
        Self::UnderstandingNeed,
        Self::CollectingCounterpartData,
        Self::CollectingPoaData,
        Self::ConfirmingData,
        Self::OfferingSolution,
        Self::Closing,
        Self::AwaitingDocumentConfirmation,
        Self::DocumentsReceived,
        Self::PowerOfAttorneySent,
    ];

    /// Wire name, as written in the system preamble and in snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Identification => "identification",
            Self::CollectingIdNumber => "collecting_id_number",
            Self::CollectingName => "collecting_name",
            Self::UnderstandingNeed => "understanding_need",
            Self::CollectingCounterpartData => "collecting_counterpart_data",
            Self::CollectingPoaData => "collecting_poa_data",
            Self::ConfirmingData => "confirming_data",
            Self::OfferingSolution => "offering_solution",
            Self::Closing => "closing",
            Self::AwaitingDocumentConfirmation => "awaiting_document_confirmation",
            Self::DocumentsReceived => "documents_received",
            Self::PowerOfAttorneySent => "power_of_attorney_sent",
        }
    }

    /// Maximum number of history entries kept in the prompt, excluding the preamble.
    pub fn history_cap(&self) -> usize {
        match self {
            Self::Initial => 10,
            Self::Closing => 8,
            _ => 15,
        }
    }

    /// Completion token limit for replies generated in this phase.
    pub fn max_reply_tokens(&self) -> u32 {
        match self {
            Self::Initial => 150,
            _ => 350,
        }
    }

    /// True while the session is still gathering the mandatory fields.
    pub fn is_collecting(&self) -> bool {
        matches!(
            self,
            Self::Initial
                | Self::Identification
                | Self::CollectingIdNumber
                | Self::CollectingName
                | Self::UnderstandingNeed
                | Self::CollectingCounterpartData
                | Self::CollectingPoaData
        )
    }

    /// Phases in which the client's own name and ID are extracted.
    pub fn collects_subject_data(&self) -> bool {
        matches!(
            self,
            Self::Identification
                | Self::CollectingIdNumber
                | Self::CollectingName
                | Self::UnderstandingNeed
        )
    }

    /// Phases in which the grantee's data is extracted.
    pub fn collects_counterpart_data(&self) -> bool {
        matches!(self, Self::CollectingCounterpartData | Self::CollectingPoaData)
    }

    /// Phases whose inbound text is run through the topic classifier.
    pub fn classifies_topic(&self) -> bool {
        matches!(
            self,
            Self::Initial | Self::Identification | Self::UnderstandingNeed
        )
    }
}

impl Default for IntakePhase {
    fn default() -> Self {
        Self::Initial
    }
}

impl std::fmt::Display for IntakePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateMachine for IntakePhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use IntakePhase::*;

        let mut targets = match self {
            Initial => vec![
                Identification,
                CollectingIdNumber,
                CollectingName,
                UnderstandingNeed,
                CollectingCounterpartData,
                ConfirmingData,
                OfferingSolution,
            ],
            Identification => vec![
                CollectingIdNumber,
                CollectingName,
                UnderstandingNeed,
                CollectingCounterpartData,
                ConfirmingData,
                OfferingSolution,
            ],
            CollectingIdNumber => vec![
                CollectingName,
                UnderstandingNeed,
                CollectingCounterpartData,
                ConfirmingData,
                OfferingSolution,
            ],
            CollectingName => vec![
                CollectingIdNumber,
                UnderstandingNeed,
                CollectingCounterpartData,
                ConfirmingData,
                OfferingSolution,
            ],
            UnderstandingNeed => vec![
                CollectingCounterpartData,
                CollectingPoaData,
                ConfirmingData,
                OfferingSolution,
            ],
            CollectingCounterpartData | CollectingPoaData => {
                vec![ConfirmingData, OfferingSolution]
            }
            ConfirmingData => vec![CollectingCounterpartData, OfferingSolution],
            OfferingSolution => vec![Closing],
            Closing => vec![],
            AwaitingDocumentConfirmation => vec![PowerOfAttorneySent, ConfirmingData],
            DocumentsReceived => vec![Closing],
            PowerOfAttorneySent => vec![Closing],
        };

        // Document callbacks may fire from any phase.
        for document_phase in [AwaitingDocumentConfirmation, DocumentsReceived] {
            if *self != document_phase {
                targets.push(document_phase);
            }
        }
        targets
    }
}
