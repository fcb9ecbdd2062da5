use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    sync::{Mutex, oneshot},
    time::timeout,
};
use tokio_stream::{StreamExt, wrappers::LinesStream};

use crate::core::traits::interpreter::{
    InitializationError, Interpreter, InterpreterError, InterpreterLoader, OutputStream,
};

const HOST_SCRIPT: &str = include_str!("host.py");
const HANDSHAKE_ID: u64 = 0;

type PendingReplies = DashMap<u64, oneshot::Sender<HostReply>>;
type ReplyStream = LinesStream<BufReader<ChildStdout>>;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum HostOp<'a> {
    Capture,
    Restore,
    Read { stream: OutputStream },
    Run { source: &'a str },
}

#[derive(Debug, Serialize)]
struct HostRequest<'a> {
    id: u64,
    #[serde(flatten)]
    op: HostOp<'a>,
}

#[derive(Debug, Deserialize)]
struct HostReply {
    id: Option<u64>,
    ok: bool,
    value: Option<String>,
    error: Option<String>,
}

impl HostReply {
    fn into_result(self) -> Result<Option<String>, String> {
        if self.ok {
            Ok(self.value)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "host reported an unspecified error".to_string()))
        }
    }
}

/// Spawns a [`PythonHost`] per load.
#[derive(Debug, Clone)]
pub struct PythonHostLoader {
    python: PathBuf,
    load_timeout: Duration,
}

impl PythonHostLoader {
    pub fn new<T: AsRef<Path>>(python: T, load_timeout: Duration) -> Self {
        Self {
            python: python.as_ref().into(),
            load_timeout,
        }
    }
}

#[async_trait::async_trait]
impl InterpreterLoader for PythonHostLoader {
    #[tracing::instrument]
    async fn load(&self) -> Result<Arc<dyn Interpreter>, InitializationError> {
        let host = PythonHost::spawn(&self.python, self.load_timeout).await?;
        Ok(Arc::new(host))
    }
}

/// A long-lived `python` child process holding one global namespace.
///
/// Requests and replies are JSON lines on the child's stdin and stdout. Code
/// runs on a worker thread inside the host, so control requests are still
/// answered while an abandoned computation keeps running. The child is killed
/// when the host is dropped.
#[derive(Debug)]
pub struct PythonHost {
    requests: Mutex<ChildStdin>,
    pending: Arc<PendingReplies>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    _child: Mutex<Child>,
}

impl PythonHost {
    pub async fn spawn(python: &Path, load_timeout: Duration) -> Result<Self, InitializationError> {
        let mut child = Command::new(python)
            .arg("-u")
            .arg("-c")
            .arg(HOST_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InitializationError::new(format!("failed to start {}: {}", python.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| InitializationError::new("Python host stdin is unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InitializationError::new("Python host stdout is unavailable"))?;

        let mut replies = LinesStream::new(BufReader::new(stdout).lines());
        await_handshake(&mut replies, load_timeout).await?;
        tracing::info!("Python host started: pid={:?}", child.id());

        let pending = Arc::new(PendingReplies::new());
        let closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(route_replies(replies, pending.clone(), closed.clone()));

        Ok(Self {
            requests: Mutex::new(stdin),
            pending,
            closed,
            next_id: AtomicU64::new(HANDSHAKE_ID + 1),
            _child: Mutex::new(child),
        })
    }

    async fn request(&self, op: HostOp<'_>) -> Result<HostReply, InterpreterError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_string(&HostRequest { id, op })
            .map_err(|e| InterpreterError::Protocol(e.to_string()))?;
        line.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(id, reply_tx);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(InterpreterError::Unavailable("Python host has exited".to_string()));
        }

        {
            let mut requests = self.requests.lock().await;
            let written = async {
                requests.write_all(line.as_bytes()).await?;
                requests.flush().await
            }
            .await;
            if let Err(e) = written {
                self.pending.remove(&id);
                return Err(InterpreterError::Unavailable(e.to_string()));
            }
        }

        reply_rx
            .await
            .map_err(|_| InterpreterError::Unavailable("Python host has exited".to_string()))
    }

    async fn control(&self, op: HostOp<'_>) -> Result<Option<String>, InterpreterError> {
        self.request(op)
            .await?
            .into_result()
            .map_err(InterpreterError::Protocol)
    }
}

#[async_trait::async_trait]
impl Interpreter for PythonHost {
    async fn redirect_output(&self) -> Result<(), InterpreterError> {
        self.control(HostOp::Capture).await.map(|_| ())
    }

    async fn restore_output(&self) -> Result<(), InterpreterError> {
        self.control(HostOp::Restore).await.map(|_| ())
    }

    async fn read_output(&self, stream: OutputStream) -> Result<String, InterpreterError> {
        Ok(self
            .control(HostOp::Read { stream })
            .await?
            .unwrap_or_default())
    }

    async fn run(&self, source: &str) -> Result<(), InterpreterError> {
        self.request(HostOp::Run { source })
            .await?
            .into_result()
            .map(|_| ())
            .map_err(InterpreterError::Raised)
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

async fn await_handshake(
    replies: &mut ReplyStream,
    load_timeout: Duration,
) -> Result<(), InitializationError> {
    let first = timeout(load_timeout, replies.next())
        .await
        .map_err(|_| InitializationError::new("timed out waiting for the Python host"))?;

    let line = match first {
        Some(Ok(line)) => line,
        Some(Err(e)) => return Err(InitializationError::new(e.to_string())),
        None => return Err(InitializationError::new("Python host exited during startup")),
    };

    match serde_json::from_str::<HostReply>(&line) {
        Ok(HostReply {
            id: Some(HANDSHAKE_ID),
            ok: true,
            ..
        }) => Ok(()),
        _ => Err(InitializationError::new(format!(
            "unexpected Python host greeting: {line:?}"
        ))),
    }
}

async fn route_replies(mut replies: ReplyStream, pending: Arc<PendingReplies>, closed: Arc<AtomicBool>) {
    while let Some(line) = replies.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read from Python host: {}", e);
                break;
            }
        };

        let reply = match serde_json::from_str::<HostReply>(&line) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Ignoring malformed host reply {:?}: {}", line, e);
                continue;
            }
        };

        let Some(id) = reply.id else {
            tracing::warn!("Host error without request id: {:?}", reply.error);
            continue;
        };

        match pending.remove(&id) {
            Some((_, reply_tx)) => {
                let _ = reply_tx.send(reply);
            }
            None => tracing::debug!("Discarding reply to abandoned request {}", id),
        }
    }

    tracing::warn!("Python host closed its reply channel");
    closed.store(true, Ordering::SeqCst);
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let run = serde_json::to_string(&HostRequest {
            id: 7,
            op: HostOp::Run { source: "print(1)" },
        })
        .unwrap();
        let read = serde_json::to_string(&HostRequest {
            id: 8,
            op: HostOp::Read {
                stream: OutputStream::Stderr,
            },
        })
        .unwrap();
        let capture = serde_json::to_string(&HostRequest {
            id: 9,
            op: HostOp::Capture,
        })
        .unwrap();

        assert_eq!(run, r#"{"id":7,"op":"run","source":"print(1)"}"#);
        assert_eq!(read, r#"{"id":8,"op":"read","stream":"stderr"}"#);
        assert_eq!(capture, r#"{"id":9,"op":"capture"}"#);
    }

    #[test]
    fn test_reply_into_result() {
        let ok: HostReply = serde_json::from_str(r#"{"id": 3, "ok": true, "value": "hi\n"}"#).unwrap();
        let failed: HostReply =
            serde_json::from_str(r#"{"id": 4, "ok": false, "error": "NameError: x"}"#).unwrap();
        let bare: HostReply = serde_json::from_str(r#"{"id": 5, "ok": false}"#).unwrap();

        assert_eq!(ok.into_result(), Ok(Some("hi\n".to_string())));
        assert_eq!(failed.into_result(), Err("NameError: x".to_string()));
        assert!(bare.into_result().is_err());
    }

    #[tokio::test]
    async fn test_missing_python_is_initialization_error() {
        let loader = PythonHostLoader::new("/nonexistent/python3", Duration::from_secs(1));

        let result = loader.load().await;

        let err = result.expect_err("loading a missing binary must fail");
        assert!(err.reason.contains("/nonexistent/python3"));
    }

    #[tokio::test]
    async fn test_non_python_binary_fails_handshake() {
        // `true` exits immediately without greeting.
        let loader = PythonHostLoader::new("true", Duration::from_secs(5));

        let err = loader.load().await.expect_err("handshake must fail");

        assert!(err.to_string().starts_with("Failed to load Python engine"));
    }
}
