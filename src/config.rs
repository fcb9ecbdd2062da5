use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::constants::{EXECUTION_TIMEOUT_MS, LOAD_TIMEOUT_MS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub python: PathBuf,
    pub execution_timeout: Duration,
    pub load_timeout: Duration,
    pub content_dir: PathBuf,
    pub backend_api_url: String,
    pub internal_api_key: String,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a local `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());
        let millis = |key: &str, default: u64| -> Result<Duration> {
            let value = match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a number of milliseconds, got {raw:?}"))?,
                None => default,
            };
            Ok(Duration::from_millis(value))
        };

        Ok(Self {
            python: text("CODEQUEST_PYTHON", "python3").into(),
            execution_timeout: millis("CODEQUEST_EXECUTION_TIMEOUT_MS", EXECUTION_TIMEOUT_MS)?,
            load_timeout: millis("CODEQUEST_LOAD_TIMEOUT_MS", LOAD_TIMEOUT_MS)?,
            content_dir: text("CODEQUEST_CONTENT_DIR", "./content").into(),
            backend_api_url: text("BACKEND_API_URL", "http://localhost:8000/api/v1"),
            internal_api_key: text("INTERNAL_API_KEY", ""),
        })
    }
}
