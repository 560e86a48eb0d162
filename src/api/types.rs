//! Wire types for the experiment server's JSON API.

use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// Participant status label that counts towards the quorum.
pub const WORKING: &str = "working";

/// `info_type` sent with every participant response.
pub const INFO_TYPE: &str = "Info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: u64,
}

/// One piece of content on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub id: Option<u64>,
    pub contents: String,
}

impl Info {
    /// Decode a word-list info: `contents` is itself a JSON array of words.
    pub fn word_list(&self) -> Result<Vec<String>, ChainError> {
        serde_json::from_str(&self.contents).map_err(|e| ChainError::json("contents", e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    #[serde(default)]
    pub id: Option<u64>,
    pub info_id: u64,
    #[serde(default)]
    pub status: Option<String>,
}

/// Participant counts by status label, as `[[label, count], ...]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(pub Vec<(String, u32)>);

impl Summary {
    /// Count for `label`, or [`ChainError::MissingStatus`] when it is absent.
    pub fn count(&self, label: &str) -> Result<u32, ChainError> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, n)| *n)
            .ok_or_else(|| ChainError::MissingStatus(label.to_string()))
    }

    /// Participants currently in the `working` state.
    pub fn ready(&self) -> Result<u32, ChainError> {
        self.count(WORKING)
    }
}

/// Form body for `POST /info/{node_id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInfo<'a> {
    pub contents: &'a str,
    pub info_type: &'static str,
}

/// Form body for `POST /question/{participant_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question: String,
    pub number: u32,
    /// JSON-encoded answers.
    pub response: String,
}

// --- response envelopes ---

#[derive(Debug, Deserialize)]
pub(crate) struct NodeEnvelope {
    pub node: Node,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParticipantEnvelope {
    pub participant: Participant,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfosEnvelope {
    pub infos: Vec<Info>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfoEnvelope {
    pub info: Info,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfoCount {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfoCountEnvelope {
    pub info: InfoCount,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransmissionsEnvelope {
    pub transmissions: Vec<Transmission>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SummaryEnvelope {
    pub summary: Summary,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuorumEnvelope {
    pub quorum: u32,
}

/// Error bodies may carry a full replacement page.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub html: Option<String>,
}
