//! Tool execution and conversation engine for kiwi.
//!
//! The [`ConversationOrchestrator`] drives a turn: it calls the model,
//! runs requested tools through the [`ToolExecutor`], and feeds results
//! back. All terminal output goes through one [`TerminalCoordinator`].

pub mod error;
pub mod executor;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;
pub mod stream;
pub mod subprocess;
pub mod terminal;
pub mod tools;
pub mod ui_writer;

pub use error::{AgentError, InterruptCause, SubprocessError, ToolError};
pub use executor::ToolExecutor;
pub use metrics::ResponseMetrics;
pub use orchestrator::{ConversationOrchestrator, TurnResult};
pub use stream::{StreamOutcome, StreamProcessor, ToolCallDetector};
pub use subprocess::{command_running, SubprocessRunner};
pub use terminal::{TerminalCoordinator, TerminalLock, TerminalState};
pub use tools::{Tool, ToolContext, ToolExecutionResult, ToolRegistry};
pub use ui_writer::{NullUiWriter, OutputStream, UiWriter};

pub use kiwi_providers::{Message, MessageRole, ToolCall};
