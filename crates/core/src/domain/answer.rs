use serde::{Deserialize, Serialize};

/// A candidate answer, as ranked by the backend (highest confidence first).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer_text: String,
    #[serde(default)]
    pub answer_context: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl Answer {
    pub fn text(answer_text: impl Into<String>) -> Self {
        Self {
            answer_text: answer_text.into(),
            answer_context: None,
            confidence: None,
            source_type: None,
            source_id: None,
        }
    }
}

/// Identifiers the backend assigns to a newly stored saved reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReplyReceipt {
    pub reply_id: String,
    pub answer_id: String,
}
