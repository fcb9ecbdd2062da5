use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    constants::{EXECUTION_TIMEOUT_MS, TIMEOUT_MESSAGE},
    core::{
        domain::ExecutionResult,
        traits::{
            executor::CodeExecutor,
            interpreter::{
                InitializationError, Interpreter, InterpreterError, InterpreterLoader,
                OutputStream,
            },
        },
    },
};

type LoadResult = Result<Arc<dyn Interpreter>, InitializationError>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

enum RuntimeState {
    Unloaded,
    Loading(LoadFuture),
    Ready(Arc<dyn Interpreter>),
}

/// Owns the single interpreter instance of a session.
///
/// Executions take turns: each one holds the turn from redirect until its
/// restore has completed, including a restore issued after the caller dropped
/// the `execute` future. A timed-out run keeps going inside the interpreter
/// and may still burn CPU while later executions run.
pub struct SandboxRuntime {
    loader: Arc<dyn InterpreterLoader>,
    state: Mutex<RuntimeState>,
    turn: Arc<AsyncMutex<()>>,
    timeout: Duration,
}

impl std::fmt::Debug for SandboxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxRuntime")
            .field("loader", &self.loader)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SandboxRuntime {
    pub fn new(loader: Arc<dyn InterpreterLoader>) -> Self {
        Self::with_timeout(loader, Duration::from_millis(EXECUTION_TIMEOUT_MS))
    }

    pub fn with_timeout(loader: Arc<dyn InterpreterLoader>, timeout: Duration) -> Self {
        Self {
            loader,
            state: Mutex::new(RuntimeState::Unloaded),
            turn: Arc::new(AsyncMutex::new(())),
            timeout,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock_state(), RuntimeState::Ready(interpreter) if interpreter.is_alive())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the interpreter at most once. Concurrent callers share the
    /// in-flight load; a failed load is forgotten so the next call retries.
    /// An interpreter that has died is dropped and loaded again.
    pub async fn ensure_ready(&self) -> LoadResult {
        let load = {
            let mut state = self.lock_state();
            match &*state {
                RuntimeState::Ready(interpreter) if interpreter.is_alive() => {
                    return Ok(interpreter.clone());
                }
                RuntimeState::Loading(load) => load.clone(),
                RuntimeState::Ready(_) | RuntimeState::Unloaded => {
                    if matches!(*state, RuntimeState::Ready(_)) {
                        tracing::warn!("Sandbox interpreter is gone, reloading");
                    }
                    tracing::info!("Loading sandbox interpreter");
                    let loader = self.loader.clone();
                    let load = async move { loader.load().await }.boxed().shared();
                    *state = RuntimeState::Loading(load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut state = self.lock_state();
        if let RuntimeState::Loading(current) = &*state {
            if current.ptr_eq(&load) {
                match &result {
                    Ok(interpreter) => {
                        tracing::info!("Sandbox interpreter ready");
                        *state = RuntimeState::Ready(interpreter.clone());
                    }
                    Err(e) => {
                        tracing::error!("Sandbox interpreter failed to load: {}", e);
                        *state = RuntimeState::Unloaded;
                    }
                }
            }
        }
        result
    }

    async fn execute_on(&self, interpreter: Arc<dyn Interpreter>, source: &str) -> ExecutionResult {
        let turn = self.turn.clone().lock_owned().await;
        let capture = match OutputCapture::acquire(interpreter.clone(), turn).await {
            Ok(capture) => capture,
            Err(e) => {
                tracing::error!("Failed to redirect interpreter output: {}", e);
                return ExecutionResult::failure("", e.to_string());
            }
        };

        let run = tokio::spawn({
            let interpreter = interpreter.clone();
            let source = source.to_owned();
            async move { interpreter.run(&source).await }
        });

        // Dropping the handle on timeout detaches the run; its result is discarded.
        let finished = tokio::select! {
            joined = run => Some(joined),
            _ = tokio::time::sleep(self.timeout) => None,
        };

        let result = match finished {
            None => {
                tracing::warn!("Execution exceeded {:?}, abandoning it", self.timeout);
                ExecutionResult::failure("", TIMEOUT_MESSAGE)
            }
            Some(Ok(Ok(()))) => {
                let stdout = capture.read(OutputStream::Stdout).await;
                let stderr = capture.read(OutputStream::Stderr).await;
                ExecutionResult::new(stdout, stderr)
            }
            Some(Ok(Err(InterpreterError::Raised(message)))) => {
                let stdout = capture.read(OutputStream::Stdout).await;
                ExecutionResult::failure(stdout, message)
            }
            Some(Ok(Err(e))) => {
                tracing::error!("Interpreter failed while running code: {}", e);
                ExecutionResult::failure("", e.to_string())
            }
            Some(Err(e)) => {
                tracing::error!("Run task failed: {}", e);
                ExecutionResult::failure("", format!("RuntimeError: {e}"))
            }
        };

        capture.release().await;
        result
    }
}

#[async_trait::async_trait]
impl CodeExecutor for SandboxRuntime {
    #[tracing::instrument(skip(self, source), fields(execution_id = %Uuid::new_v4()))]
    async fn execute(&self, source: &str) -> ExecutionResult {
        let interpreter = match self.ensure_ready().await {
            Ok(interpreter) => interpreter,
            Err(e) => return ExecutionResult::failure("", e.to_string()),
        };

        let result = self.execute_on(interpreter, source).await;
        tracing::debug!("Execution result: {:?}", result);
        result
    }
}

/// Output redirection held for the duration of one execution.
///
/// Restores the interpreter's streams exactly once: through `release`, or on
/// drop when the owning future was abandoned before releasing. The turn is
/// given back only after the restore has been answered.
struct OutputCapture {
    interpreter: Arc<dyn Interpreter>,
    turn: Option<OwnedMutexGuard<()>>,
}

impl OutputCapture {
    async fn acquire(
        interpreter: Arc<dyn Interpreter>,
        turn: OwnedMutexGuard<()>,
    ) -> Result<Self, InterpreterError> {
        interpreter.redirect_output().await?;
        Ok(Self {
            interpreter,
            turn: Some(turn),
        })
    }

    async fn read(&self, stream: OutputStream) -> String {
        self.interpreter
            .read_output(stream)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to read captured {:?}: {}", stream, e);
                String::new()
            })
    }

    async fn release(mut self) {
        let turn = self.turn.take();
        restore(self.interpreter.as_ref()).await;
        drop(turn);
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        let Some(turn) = self.turn.take() else {
            return;
        };
        let interpreter = self.interpreter.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                restore(interpreter.as_ref()).await;
                drop(turn);
            });
        }
    }
}

async fn restore(interpreter: &dyn Interpreter) {
    if let Err(e) = interpreter.restore_output().await {
        tracing::warn!("Failed to restore interpreter output: {}", e);
    }
}
