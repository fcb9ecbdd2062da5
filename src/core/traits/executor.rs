use crate::core::domain::ExecutionResult;

/// The "execute source, capture output, enforce timeout" capability.
///
/// Implementations never fail: every fault is folded into the returned result.
#[mockall::automock]
#[async_trait::async_trait]
pub trait CodeExecutor: std::fmt::Debug + Send + Sync {
    async fn execute(&self, source: &str) -> ExecutionResult;
}
