use std::sync::Arc;

use serde::Serialize;

/// Output stream of the embedded interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpreterError {
    /// The executed code raised; carries the rendered exception.
    #[error("{0}")]
    Raised(String),
    #[error("sandbox host is unavailable: {0}")]
    Unavailable(String),
    #[error("sandbox protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to load Python engine: {reason}")]
pub struct InitializationError {
    pub reason: String,
}

impl InitializationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A loaded interpreter instance with one persistent global namespace.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Interpreter: std::fmt::Debug + Send + Sync {
    /// Points the interpreter's stdout and stderr at two fresh, empty buffers.
    async fn redirect_output(&self) -> Result<(), InterpreterError>;

    async fn restore_output(&self) -> Result<(), InterpreterError>;

    async fn read_output(&self, stream: OutputStream) -> Result<String, InterpreterError>;

    async fn run(&self, source: &str) -> Result<(), InterpreterError>;

    /// False once the interpreter can no longer serve requests.
    fn is_alive(&self) -> bool;
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait InterpreterLoader: std::fmt::Debug + Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Interpreter>, InitializationError>;
}
