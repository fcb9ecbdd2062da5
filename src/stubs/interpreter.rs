use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use crate::core::traits::interpreter::{
    InitializationError, Interpreter, InterpreterError, InterpreterLoader, OutputStream,
};

/// Interpreter that sleeps for `delay` on every run, then returns `result`.
///
/// `journal` records `redirect`, `run:<source>` and `restore` in the order
/// the calls happened; a restore is logged once its `restore_delay` is over.
#[derive(Debug)]
pub struct InterpreterStub {
    result: Result<(), InterpreterError>,
    delay: Duration,
    restore_delay: Duration,
    stdout: String,
    pub redirects: AtomicUsize,
    pub restores: AtomicUsize,
    pub journal: Mutex<Vec<String>>,
    pub alive: AtomicBool,
}

impl InterpreterStub {
    pub fn new(result: Result<(), InterpreterError>, delay: Duration) -> Self {
        Self {
            result,
            delay,
            restore_delay: Duration::ZERO,
            stdout: String::new(),
            redirects: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
            journal: Mutex::new(Vec::new()),
            alive: AtomicBool::new(true),
        }
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn with_restore_delay(mut self, restore_delay: Duration) -> Self {
        self.restore_delay = restore_delay;
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

#[async_trait::async_trait]
impl Interpreter for InterpreterStub {
    async fn redirect_output(&self) -> Result<(), InterpreterError> {
        self.redirects.fetch_add(1, Ordering::SeqCst);
        self.record("redirect".to_string());
        Ok(())
    }

    async fn restore_output(&self) -> Result<(), InterpreterError> {
        tokio::time::sleep(self.restore_delay).await;
        self.restores.fetch_add(1, Ordering::SeqCst);
        self.record("restore".to_string());
        Ok(())
    }

    async fn read_output(&self, stream: OutputStream) -> Result<String, InterpreterError> {
        match stream {
            OutputStream::Stdout => Ok(self.stdout.clone()),
            OutputStream::Stderr => Ok(String::new()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn run(&self, source: &str) -> Result<(), InterpreterError> {
        tracing::debug!("Start run: source={:?}", source);
        self.record(format!("run:{source}"));
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Run result: {:?}", self.result);

        self.result.clone()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Loader that takes `delay` per load and counts how often it was called.
#[derive(Debug)]
pub struct LoaderStub {
    interpreter: Arc<InterpreterStub>,
    delay: Duration,
    failures_left: AtomicUsize,
    pub loads: AtomicUsize,
}

impl LoaderStub {
    pub fn ready(interpreter: Arc<InterpreterStub>, delay: Duration) -> Self {
        Self {
            interpreter,
            delay,
            failures_left: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(interpreter: Arc<InterpreterStub>, delay: Duration) -> Self {
        Self {
            failures_left: AtomicUsize::new(1),
            ..Self::ready(interpreter, delay)
        }
    }
}

#[async_trait::async_trait]
impl InterpreterLoader for LoaderStub {
    async fn load(&self) -> Result<Arc<dyn Interpreter>, InitializationError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(InitializationError::new("network fetch failed"));
        }
        Ok(self.interpreter.clone())
    }
}
