//! Runs one tool call with confirmation, bounded retries and a summary.

use crate::error::{AgentError, ToolError};
use crate::terminal::TerminalCoordinator;
use crate::tools::{Tool, ToolContext, ToolExecutionResult};
use serde_json::{Map, Value};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
pub const CONFIRMATION_PROMPT: &str = "Do you want to execute this command? (y/N): ";

pub struct ToolExecutor {
    terminal: Arc<TerminalCoordinator>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ToolExecutor {
    pub fn new(terminal: Arc<TerminalCoordinator>) -> Self {
        Self {
            terminal,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Execute `tool` with terminal feedback.
    ///
    /// Sequence: tool indicator, optional confirmation, up to `max_retries`
    /// attempts (retrying only retryable errors), then one summary line and
    /// the step trace of the last attempt.
    pub async fn execute_with_feedback(
        &self,
        tool: &dyn Tool,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<String, AgentError> {
        let name = tool.name();
        self.terminal
            .start_tool(&format!("[Tool: {}] executing...", name))
            .await;

        if tool.requires_confirmation() {
            self.confirm(tool, args).await?;
            self.terminal
                .start_tool(&format!("[Tool: {}] executing...", name))
                .await;
        }

        let started = Instant::now();
        let mut attempt = 0;
        let (result, outcome) = loop {
            attempt += 1;
            let mut result = ToolExecutionResult::default();

            match tool.execute(args, ctx, &mut result).await {
                Ok(output) => {
                    result.output = Some(output.clone());
                    break (result, Ok(output));
                }
                Err(err) => {
                    let retry = attempt < self.max_retries
                        && err.is_retryable()
                        && !ctx.cancellation.is_cancelled();
                    if !retry {
                        break (result, Err(err));
                    }

                    debug!("Tool {} attempt {} failed: {}", name, attempt, err);
                    self.terminal.idle().await;
                    self.terminal
                        .println(&format!("  → Attempt {} failed: {}. Retrying...", attempt, err));
                    tokio::time::sleep(self.retry_backoff).await;
                    self.terminal
                        .start_tool(&format!("[Tool: {}] executing (attempt {})...", name, attempt + 1))
                        .await;
                }
            }
        };
        let elapsed = started.elapsed();

        self.terminal.idle().await;
        self.print_summary(name, &result, elapsed);

        match outcome {
            Ok(output) => Ok(output),
            Err(err) => {
                self.print_failure(attempt, &err);
                warn!("Tool {} failed after {} attempt(s): {}", name, attempt, err);
                Err(AgentError::ToolExecutionFailed {
                    tool: name.to_string(),
                    attempts: attempt,
                    source: err,
                })
            }
        }
    }

    async fn confirm(&self, tool: &dyn Tool, args: &Map<String, Value>) -> Result<(), AgentError> {
        let name = tool.name();
        self.terminal.idle().await;

        let lock = self.terminal.lock().ok_or_else(|| {
            AgentError::Confirmation(io::Error::new(io::ErrorKind::WouldBlock, "terminal is busy"))
        })?;

        lock.println(&format!("[Tool: {}] requires confirmation:", name));
        let primary = tool
            .primary_argument()
            .and_then(|key| args.get(key))
            .and_then(Value::as_str);
        match primary {
            Some(value) => lock.println(&format!("  {}", value)),
            None => lock.println(&format!(
                "Execute {} with params: {}",
                name,
                Value::Object(args.clone())
            )),
        }

        let key = blocking(|| lock.read_key(CONFIRMATION_PROMPT)).map_err(AgentError::Confirmation)?;
        if matches!(key, 'y' | 'Y') {
            return Ok(());
        }

        lock.println("  → Skipped: declined by user");
        Err(AgentError::UserDeclinedConfirmation {
            tool: name.to_string(),
        })
    }

    fn print_summary(&self, name: &str, result: &ToolExecutionResult, elapsed: Duration) {
        let method = if result.method_name.is_empty() {
            "execute"
        } else {
            result.method_name.as_str()
        };
        self.terminal.println(&format!(
            "🔧 [Tool: {}:{}] executed in {:.3}s",
            name,
            method,
            elapsed.as_secs_f64()
        ));
        for step in &result.steps {
            self.terminal.println(&format!("  → {}", step));
        }
    }

    fn print_failure(&self, attempts: u32, err: &ToolError) {
        let line = if err.is_interrupted() {
            format!("  → Interrupted: {}", err)
        } else if attempts >= self.max_retries {
            format!("  → All {} attempts failed. Last error: {}", attempts, err)
        } else {
            format!("  → Failed: {}", err)
        };
        self.terminal.println(&line);
    }
}

/// Run a blocking terminal read without stalling other tasks on this worker.
///
/// `block_in_place` needs the multi-thread runtime; elsewhere the read runs
/// inline.
fn blocking<T>(read: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(read)
        }
        _ => read(),
    }
}
