use std::sync::Arc;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    constants::{LANGUAGE_VERSION, MAX_CODE_SIZE_BYTES},
    core::{
        domain::{ExecutionResult, QuestBundle, TestRunResult},
        glitch::{FALLBACK_HINT, GlitchCategory, GlitchInfo, classify},
        grading::GradingPipeline,
        traits::{
            executor::CodeExecutor,
            submission::{SubmissionClient, SubmissionError, SubmissionRequest, SubmissionStatus},
        },
    },
};

const RULE: &str = "──────────────────────────";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("this code has not passed the quest tests yet")]
    NotVerified,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub execution: ExecutionResult,
    pub glitch: Option<GlitchInfo>,
    pub tests: Option<TestRunResult>,
    pub graded_at: DateTime<Utc>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.tests.as_ref().is_some_and(|tests| tests.passed)
    }

    /// Terminal-style footer describing the test verdict.
    pub fn summary(&self) -> String {
        let Some(tests) = &self.tests else {
            return String::new();
        };
        if tests.passed {
            return format!("{RULE}\nAll tests passed! You may now submit.\n");
        }

        let failures = tests
            .results
            .iter()
            .filter(|outcome| !outcome.passed)
            .map(|outcome| match &outcome.message {
                Some(message) if !message.is_empty() => {
                    format!("  x {}: {}", outcome.test_name, message)
                }
                _ => format!("  x {}", outcome.test_name),
            })
            .join("\n");
        format!(
            "{RULE}\nTests: {}/{} passed\n{failures}\n",
            tests.passed_count(),
            tests.results.len()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SubmitOutcome {
    Accepted {
        xp_earned: u32,
        level_up: bool,
        new_level: Option<u32>,
        unlocked_badges: Vec<String>,
        feedback: String,
    },
    Rejected {
        glitch: GlitchInfo,
    },
}

/// One learner working on one quest: run, check, then submit.
///
/// Methods take `&mut self`, which keeps executions against the shared
/// interpreter strictly sequential.
#[derive(Debug)]
pub struct QuestSession {
    quest: QuestBundle,
    executor: Arc<dyn CodeExecutor>,
    pipeline: GradingPipeline,
    submitter: Arc<dyn SubmissionClient>,
    verified_code: Option<String>,
}

impl QuestSession {
    pub fn new(
        quest: QuestBundle,
        executor: Arc<dyn CodeExecutor>,
        submitter: Arc<dyn SubmissionClient>,
    ) -> Self {
        Self {
            quest,
            pipeline: GradingPipeline::new(executor.clone()),
            executor,
            submitter,
            verified_code: None,
        }
    }

    pub fn quest(&self) -> &QuestBundle {
        &self.quest
    }

    pub fn can_submit(&self, code: &str) -> bool {
        self.verified_code.as_deref() == Some(code)
    }

    #[tracing::instrument(skip_all, fields(quest_id = %self.quest.quest_id))]
    pub async fn run(&mut self, code: &str) -> RunReport {
        self.verified_code = None;

        let execution = self.executor.execute(code).await;
        if !execution.succeeded() {
            let glitch = classify(execution.standard_error());
            tracing::info!("Code raised {} before grading", glitch.error_kind);
            return RunReport {
                execution,
                glitch: Some(glitch),
                tests: None,
                graded_at: Utc::now(),
            };
        }

        let tests = self.pipeline.grade(code, &self.quest.test_code).await;
        let glitch = if tests.passed {
            self.verified_code = Some(code.to_string());
            None
        } else {
            tests
                .first_failure()
                .and_then(|outcome| outcome.message.as_deref())
                .filter(|message| !message.is_empty())
                .map(|message| GlitchInfo::new("AssertionError", GlitchCategory::QuestGlitch, message))
        };

        RunReport {
            execution,
            glitch,
            tests: Some(tests),
            graded_at: Utc::now(),
        }
    }

    #[tracing::instrument(skip_all, fields(quest_id = %self.quest.quest_id))]
    pub async fn submit(&self, code: &str) -> Result<SubmitOutcome, SessionError> {
        if !self.can_submit(code) {
            return Err(SessionError::NotVerified);
        }

        if code.len() > MAX_CODE_SIZE_BYTES {
            return Ok(SubmitOutcome::Rejected {
                glitch: GlitchInfo::new(
                    "ValidationError",
                    GlitchCategory::QuestGlitch,
                    "Your code is too large! Please keep it under 10 KB.",
                ),
            });
        }

        let request = SubmissionRequest {
            quest_id: self.quest.quest_id.clone(),
            code: code.to_string(),
            language_version: LANGUAGE_VERSION.to_string(),
        };

        let response = match self.submitter.submit(&request).await {
            Ok(response) => response,
            Err(SubmissionError::Rejected { status, detail }) => {
                tracing::warn!("Grading server refused the submission: {} {}", status, detail);
                return Ok(SubmitOutcome::Rejected {
                    glitch: GlitchInfo::new("ServerError", GlitchCategory::QuestGlitch, FALLBACK_HINT),
                });
            }
            Err(e) => {
                tracing::warn!("Submission failed: {}", e);
                return Ok(SubmitOutcome::Rejected {
                    glitch: GlitchInfo::new(
                        "NetworkError",
                        GlitchCategory::RuntimeGlitch,
                        "Connection lost! Your code is safe \u{2014} try submitting again in a moment.",
                    ),
                });
            }
        };

        if response.status == SubmissionStatus::Success {
            tracing::info!("Quest complete: xp_earned={:?}", response.xp_earned);
            return Ok(SubmitOutcome::Accepted {
                xp_earned: response.xp_earned.unwrap_or(0),
                level_up: response.level_up,
                new_level: response.new_level,
                unlocked_badges: response.unlocked_badges,
                feedback: response
                    .feedback
                    .unwrap_or_else(|| "Quest Complete!".to_string()),
            });
        }

        Ok(SubmitOutcome::Rejected {
            glitch: GlitchInfo::new(
                response.error_type.unwrap_or_else(|| "ServerError".to_string()),
                GlitchCategory::QuestGlitch,
                response.hint.unwrap_or_else(|| FALLBACK_HINT.to_string()),
            ),
        })
    }
}
