//! Error types for tool execution and the conversation loop.
//!
//! Three layers: [`SubprocessError`] for a single shell run, [`ToolError`]
//! for one tool attempt, and [`AgentError`] for what the orchestrator and
//! executor report. Only [`AgentError::Transport`],
//! [`AgentError::Cancelled`] and [`AgentError::ToolLoopLimitExceeded`] end a
//! turn; everything else is fed back to the model as a tool result.

use std::fmt;
use std::io;
use thiserror::Error;

/// Why a subprocess was stopped before it exited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptCause {
    /// An OS signal (e.g. "SIGINT") was received and forwarded to the child.
    Signal(String),
    /// The caller's cancellation token fired.
    Cancelled,
}

impl fmt::Display for InterruptCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptCause::Signal(name) => write!(f, "received {}", name),
            InterruptCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to start {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: io::Error,
    },

    #[error("command failed: {status}")]
    NonZeroExit {
        status: String,
        code: Option<i32>,
        output: String,
    },

    #[error("command interrupted: {cause}")]
    Interrupted { cause: InterruptCause, output: String },

    #[error("i/o error while running command: {0}")]
    Io(#[from] io::Error),
}

impl SubprocessError {
    /// Whatever the command printed before it failed, if anything.
    pub fn output(&self) -> Option<&str> {
        match self {
            SubprocessError::NonZeroExit { output, .. } | SubprocessError::Interrupted { output, .. } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SubprocessError::NonZeroExit { .. } | SubprocessError::Io(_))
    }
}

/// Failure of one tool attempt.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::InvalidArguments(_) => false,
            ToolError::Subprocess(err) => err.is_retryable(),
            ToolError::Failed(_) => true,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ToolError::Subprocess(SubprocessError::Interrupted { .. }))
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model request failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool '{tool}' failed after {attempts} attempt(s): {source}")]
    ToolExecutionFailed {
        tool: String,
        attempts: u32,
        #[source]
        source: ToolError,
    },

    #[error("user declined to execute '{tool}'")]
    UserDeclinedConfirmation { tool: String },

    #[error("failed to read confirmation: {0}")]
    Confirmation(#[source] io::Error),

    #[error("turn cancelled")]
    Cancelled,

    #[error("stopped after {max_calls} model calls without a final answer")]
    ToolLoopLimitExceeded { max_calls: usize },
}

impl AgentError {
    /// Text sent back to the model in place of tool output.
    pub fn to_tool_result(&self) -> String {
        match self {
            AgentError::ToolExecutionFailed { source, .. } => match source {
                ToolError::Subprocess(inner) => match inner.output().map(str::trim_end) {
                    Some(output) if !output.is_empty() => {
                        format!("Error: {}\nOutput:\n{}", self, output)
                    }
                    _ => format!("Error: {}", self),
                },
                _ => format!("Error: {}", self),
            },
            _ => format!("Error: {}", self),
        }
    }
}
