use crate::core::domain::QuestBundle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestError {
    #[error("quest '{0}' not found or has no test file")]
    NotFound(String),
    #[error("invalid quest id '{0}'")]
    InvalidId(String),
    #[error("failed to read quest '{quest_id}': {msg}")]
    Io { quest_id: String, msg: String },
}

/// Content collaborator: hands out quest sources as opaque text.
#[mockall::automock]
#[async_trait::async_trait]
pub trait QuestSource: std::fmt::Debug + Send + Sync {
    async fn bundle(&self, quest_id: &str) -> Result<QuestBundle, QuestError>;

    async fn starter_code(&self, quest_id: &str) -> Result<String, QuestError>;
}
