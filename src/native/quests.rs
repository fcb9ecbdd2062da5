use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tokio::fs;

use crate::core::{
    domain::QuestBundle,
    traits::quests::{QuestError, QuestSource},
};

/// Reads quests from a content directory.
///
/// A quest id `<level>/<number>` resolves to `<root>/<level>/test_<number>.py`
/// (required) and `<root>/<level>/starter_<number>.py` (optional).
#[derive(Debug)]
pub struct FsQuestSource {
    root: PathBuf,
    cache: DashMap<String, QuestBundle>,
}

impl FsQuestSource {
    pub fn new<T: AsRef<Path>>(root: T) -> Self {
        Self {
            root: root.as_ref().into(),
            cache: DashMap::new(),
        }
    }

    fn paths(&self, quest_id: &str) -> Result<(PathBuf, PathBuf), QuestError> {
        let invalid = || QuestError::InvalidId(quest_id.to_string());
        let (level, number) = quest_id.split_once('/').ok_or_else(invalid)?;

        let is_segment = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if !is_segment(level) || !is_segment(number) {
            return Err(invalid());
        }

        let dir = self.root.join(level);
        Ok((
            dir.join(format!("starter_{number}.py")),
            dir.join(format!("test_{number}.py")),
        ))
    }
}

async fn read_optional(path: &Path, quest_id: &str) -> Result<Option<String>, QuestError> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(QuestError::Io {
            quest_id: quest_id.to_string(),
            msg: format!("{}: {}", path.display(), e),
        }),
    }
}

#[async_trait::async_trait]
impl QuestSource for FsQuestSource {
    #[tracing::instrument(skip(self))]
    async fn bundle(&self, quest_id: &str) -> Result<QuestBundle, QuestError> {
        if let Some(bundle) = self.cache.get(quest_id) {
            return Ok(bundle.clone());
        }

        let (starter_path, test_path) = self.paths(quest_id)?;
        let test_code = read_optional(&test_path, quest_id)
            .await?
            .ok_or_else(|| QuestError::NotFound(quest_id.to_string()))?;
        let starter_code = read_optional(&starter_path, quest_id)
            .await?
            .map(|code| code.trim_end().to_string())
            .unwrap_or_default();

        let bundle = QuestBundle {
            quest_id: quest_id.to_string(),
            starter_code,
            test_code,
        };
        tracing::debug!("Loaded quest {} from {}", quest_id, test_path.display());
        self.cache.insert(quest_id.to_string(), bundle.clone());
        Ok(bundle)
    }

    async fn starter_code(&self, quest_id: &str) -> Result<String, QuestError> {
        Ok(self.bundle(quest_id).await?.starter_code)
    }
}
