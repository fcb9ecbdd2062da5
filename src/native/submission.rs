use std::time::Duration;

use serde::Deserialize;

use crate::core::traits::submission::{
    SubmissionClient, SubmissionError, SubmissionRequest, SubmissionResponse,
};

const INTERNAL_KEY_HEADER: &str = "X-Internal-Key";

/// Posts verified solutions to `{base_url}/quests/{id}/submit`.
#[derive(Debug, Clone)]
pub struct HttpSubmissionClient {
    base_url: reqwest::Url,
    api_key: String,
    http_client: reqwest::Client,
}

impl HttpSubmissionClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SubmissionError> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| SubmissionError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SubmissionError::InvalidUrl(base_url.to_string()));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("codequest-harness/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            http_client,
        })
    }

    /// The quest id is percent-encoded into a single path segment.
    fn submit_url(&self, quest_id: &str) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["quests", quest_id, "submit"]);
        }
        url
    }
}

#[async_trait::async_trait]
impl SubmissionClient for HttpSubmissionClient {
    #[tracing::instrument(skip(self, request), fields(quest_id = %request.quest_id))]
    async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse, SubmissionError> {
        let response = self
            .http_client
            .post(self.submit_url(&request.quest_id))
            .header(INTERNAL_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;
        tracing::debug!("Grading server answered {}: {}", status, body);

        serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                SubmissionError::Decode(e.to_string())
            } else {
                SubmissionError::Rejected {
                    status: status.as_u16(),
                    detail: error_detail(&body),
                }
            }
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Pulls `detail` out of a framework error body, falling back to the raw text.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|error| error.detail)
        .unwrap_or_else(|_| body.trim().to_string())
}
