//! Generative model client — the black box behind the deep signal
//!
//! Defines the client trait the deep analyzer calls. Two implementations:
//! - `CommandModel`: spawns a configured command, writes the prompt to its
//!   stdin and reads the completion from stdout (production)
//! - `MockModel`: returns preconfigured completions (testing)

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Errors from generative model operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("model not available: {0}")]
    Unavailable(String),
    #[error("invocation failed: {0}")]
    InvocationFailed(String),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Client trait for a text-completion model.
///
/// Abstracts over transport so the deep analyzer doesn't depend on how
/// the model is reached.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Check if the model is reachable.
    async fn is_available(&self) -> bool;

    /// Complete a prompt, returning the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Runs an external command per completion.
pub struct CommandModel {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandModel {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GenerativeModel for CommandModel {
    async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ModelError::Unavailable(format!("failed to start {}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ModelError::InvocationFailed("no stdin available".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ModelError::InvocationFailed("no stdout available".to_string()))?;

        // The child may stream output before it has read the whole prompt,
        // so writing and reading must make progress together.
        let exchange = async {
            let write = async move {
                let result = stdin.write_all(prompt.as_bytes()).await;
                drop(stdin);
                match result {
                    // A child that stops reading early is judged by its exit status.
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(
                        ModelError::InvocationFailed(format!("failed to write prompt: {}", e)),
                    ),
                    _ => Ok(()),
                }
            };
            let read = async {
                let mut output = String::new();
                stdout.read_to_string(&mut output).await.map(|_| output)
            };
            let (written, read) = tokio::join!(write, read);
            written?;
            let output = read.map_err(|e| {
                ModelError::InvocationFailed(format!("failed to read output: {}", e))
            })?;

            let status = child
                .wait()
                .await
                .map_err(|e| ModelError::InvocationFailed(e.to_string()))?;
            if !status.success() {
                return Err(ModelError::InvocationFailed(format!(
                    "{} exited with {}",
                    self.program, status
                )));
            }
            Ok::<String, ModelError>(output)
        };

        let output = timeout(self.timeout, exchange).await.map_err(|_| {
            ModelError::InvocationFailed(format!("completion timed out after {:?}", self.timeout))
        })??;

        debug!(bytes = output.len(), "model completion received");
        Ok(output)
    }
}

/// Mock model for testing — returns preconfigured completions in order,
/// repeating the last one once the queue is drained.
pub struct MockModel {
    available: bool,
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    /// Create a mock model that reports as available.
    pub fn available() -> Self {
        Self {
            available: true,
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock model that reports as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Queue a successful completion.
    pub fn with_response(self, response: impl Into<String>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.into()));
        }
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, error: ModelError) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        if !self.available {
            return Err(ModelError::Unavailable(
                "mock model configured as unavailable".to_string(),
            ));
        }
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| ModelError::InvocationFailed("mock lock poisoned".to_string()))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.unwrap_or_else(|| {
            Err(ModelError::InvocationFailed(
                "no mock response configured".to_string(),
            ))
        })
    }
}

/// Extract the first JSON object from model output.
///
/// Handles bare JSON, fenced ```json blocks, and prose around a `{...}`.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```\n") {
        let after = &trimmed[start + 4..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };
    if let Some(v) = fenced.and_then(|b| serde_json::from_str::<serde_json::Value>(b.trim()).ok()) {
        if v.is_object() {
            return Some(v);
        }
    }

    let (start, end) = (trimmed.find('{')?, trimmed.rfind('}')?);
    if start >= end {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
        .ok()
        .filter(|v| v.is_object())
}
