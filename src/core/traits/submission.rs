use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmissionRequest {
    pub quest_id: String,
    pub code: String,
    pub language_version: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Success,
    Fail,
    #[serde(other)]
    Unknown,
}

/// Verdict returned by the verification endpoint. Only displayed fields are read.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SubmissionResponse {
    pub status: SubmissionStatus,
    #[serde(default)]
    pub xp_earned: Option<u32>,
    #[serde(default)]
    pub level_up: bool,
    #[serde(default)]
    pub new_level: Option<u32>,
    #[serde(default)]
    pub unlocked_badges: Vec<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("could not reach the grading server: {0}")]
    Network(String),
    #[error("unreadable grading server response: {0}")]
    Decode(String),
    #[error("invalid grading server url: {0}")]
    InvalidUrl(String),
    /// The server answered, but with an error status and no verdict.
    #[error("grading server returned {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait SubmissionClient: std::fmt::Debug + Send + Sync {
    async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse, SubmissionError>;
}
