//! The multi-turn tool loop.
//!
//! One call to [`ConversationOrchestrator::run`] is one user turn: the model
//! is called, any tools it asks for are executed and their results appended,
//! and the model is called again, until it answers without tool calls or the
//! call budget runs out.

use crate::error::AgentError;
use crate::executor::ToolExecutor;
use crate::metrics::ResponseMetrics;
use crate::stream::{ExecutionState, StreamOutcome, StreamProcessor, NULL_CONTENT_RECOVERY_TEXT};
use crate::terminal::TerminalCoordinator;
use crate::tools::{ToolContext, ToolRegistry};
use kiwi_config::Config;
use kiwi_providers::{is_null_content_error, CompletionRequest, LLMProvider, Message, ToolCall, Usage};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub text: String,
    pub metrics: ResponseMetrics,
    /// The reply was synthesised after a null-content error that followed
    /// tool activity.
    pub recovered: bool,
}

struct ModelReply {
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<Usage>,
    recovered: bool,
}

impl From<StreamOutcome> for ModelReply {
    fn from(outcome: StreamOutcome) -> Self {
        Self {
            text: outcome.full_text,
            tool_calls: outcome.tool_calls,
            usage: outcome.usage,
            recovered: outcome.recovered,
        }
    }
}

pub struct ConversationOrchestrator {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    terminal: Arc<TerminalCoordinator>,
    executor: ToolExecutor,
    stream_processor: StreamProcessor,
    streaming: bool,
    max_calls: usize,
    working_dir: PathBuf,
    cancellation: CancellationToken,
}

impl ConversationOrchestrator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        terminal: Arc<TerminalCoordinator>,
        config: &Config,
    ) -> Self {
        let executor = ToolExecutor::new(terminal.clone())
            .with_max_retries(config.agent.max_retries)
            .with_retry_backoff(Duration::from_millis(config.agent.retry_backoff_ms));
        let stream_processor =
            StreamProcessor::new(terminal.clone()).with_flush_threshold(config.agent.stream_flush_threshold);

        Self {
            provider,
            tools,
            terminal,
            executor,
            stream_processor,
            streaming: config.ui.streaming,
            max_calls: config.max_model_calls(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = dir.to_path_buf();
        self
    }

    pub fn with_stream_processor(mut self, processor: StreamProcessor) -> Self {
        self.stream_processor = processor;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// `provider/model`, used to label metrics.
    pub fn label(&self) -> String {
        format!("{}/{}", self.provider.name(), self.provider.model())
    }

    /// Run one turn over `messages`, appending assistant and tool messages.
    ///
    /// Messages already in the list are never reordered, and every tool
    /// result follows the assistant message that requested it, in request
    /// order.
    pub async fn run(&self, messages: &mut Vec<Message>) -> Result<TurnResult, AgentError> {
        self.run_with_cancellation(messages, self.cancellation.child_token())
            .await
    }

    /// Like [`run`](Self::run), but stops with [`AgentError::Cancelled`] once
    /// `cancellation` fires. A running command is stopped and its partial
    /// result is still recorded before the turn ends.
    pub async fn run_with_cancellation(
        &self,
        messages: &mut Vec<Message>,
        cancellation: CancellationToken,
    ) -> Result<TurnResult, AgentError> {
        let turn_started = Instant::now();
        let mut metrics = ResponseMetrics::default();
        let mut tools_ran = false;

        for call_index in 1..=self.max_calls {
            if cancellation.is_cancelled() {
                return Err(self.cancelled());
            }
            self.terminal.start_thinking().await;

            let request = CompletionRequest::new(messages.clone(), self.streaming)
                .with_tools(self.tools.definitions());
            debug!("Model call {}/{} with {} messages", call_index, self.max_calls, messages.len());

            let model_started = Instant::now();
            let reply = tokio::select! {
                reply = self.model_reply(request) => reply,
                _ = cancellation.cancelled() => return Err(self.cancelled()),
            };
            metrics.model_time += model_started.elapsed();

            let reply = match reply {
                Ok(reply) => reply,
                Err(err) if tools_ran && is_null_content_error(&err) => {
                    warn!("Null content after tool results, treating as success");
                    return Ok(self.finish_recovered(messages, metrics, turn_started).await);
                }
                Err(err) => {
                    self.terminal.force_idle();
                    warn!("Model call failed: {:#}", err);
                    return Err(AgentError::Transport(err));
                }
            };
            if let Some(usage) = &reply.usage {
                metrics.add_usage(usage);
            }

            if reply.tool_calls.is_empty() {
                self.terminal.idle().await;
                self.finish_output(&reply.text);
                if reply.recovered {
                    return Ok(self.finish_recovered(messages, metrics, turn_started).await);
                }
                debug!("Final reply state: {:?}", ExecutionState::from_response(&reply.text));
                messages.push(Message::assistant(reply.text.clone()));
                metrics.finish(turn_started.elapsed());
                return Ok(TurnResult {
                    text: reply.text,
                    metrics,
                    recovered: false,
                });
            }

            let calls = with_call_ids(reply.tool_calls);
            if !reply.text.is_empty() {
                self.terminal.idle().await;
                self.finish_output(&reply.text);
            }
            messages.push(Message::assistant_with_tool_calls(reply.text, calls.clone()));

            let tools_started = Instant::now();
            for call in &calls {
                let content = self.dispatch(call, &cancellation).await;
                messages.push(Message::tool_result(call.id.clone(), content));
            }
            metrics.tool_time += tools_started.elapsed();
            tools_ran = true;

            if cancellation.is_cancelled() {
                return Err(self.cancelled());
            }
            if reply.recovered {
                return Ok(self.finish_recovered(messages, metrics, turn_started).await);
            }
        }

        self.terminal.idle().await;
        info!("Tool loop hit the limit of {} model calls", self.max_calls);
        Err(AgentError::ToolLoopLimitExceeded {
            max_calls: self.max_calls,
        })
    }

    /// End the turn with the canned reply for a null-content error that
    /// followed tool activity.
    async fn finish_recovered(
        &self,
        messages: &mut Vec<Message>,
        mut metrics: ResponseMetrics,
        turn_started: Instant,
    ) -> TurnResult {
        self.terminal.idle().await;
        self.terminal.println(NULL_CONTENT_RECOVERY_TEXT);
        messages.push(Message::assistant(NULL_CONTENT_RECOVERY_TEXT));
        metrics.finish(turn_started.elapsed());
        TurnResult {
            text: NULL_CONTENT_RECOVERY_TEXT.to_string(),
            metrics,
            recovered: true,
        }
    }

    fn cancelled(&self) -> AgentError {
        self.terminal.force_idle();
        info!("Turn cancelled");
        AgentError::Cancelled
    }

    async fn model_reply(&self, request: CompletionRequest) -> anyhow::Result<ModelReply> {
        if self.streaming {
            self.stream_reply(request).await
        } else {
            self.complete_reply(request).await
        }
    }

    async fn stream_reply(&self, request: CompletionRequest) -> anyhow::Result<ModelReply> {
        let stream = self.provider.stream(request).await?;
        let terminal = self.terminal.clone();
        let outcome = self
            .stream_processor
            .consume(stream, |text| terminal.print(text))
            .await?;
        Ok(outcome.into())
    }

    async fn complete_reply(&self, request: CompletionRequest) -> anyhow::Result<ModelReply> {
        let response = self.provider.complete(request).await?;
        Ok(ModelReply {
            text: response.content,
            tool_calls: response.tool_calls,
            usage: Some(response.usage),
            recovered: false,
        })
    }

    /// Print non-streamed text, or end the streamed line.
    fn finish_output(&self, text: &str) {
        if self.streaming {
            if !text.is_empty() && !text.ends_with('\n') {
                self.terminal.println("");
            }
        } else if !text.is_empty() {
            self.terminal.println(text.trim_end_matches('\n'));
        }
    }

    /// Run one call and produce the text for its tool-result message.
    async fn dispatch(&self, call: &ToolCall, cancellation: &CancellationToken) -> String {
        let Some(tool) = self.tools.get(&call.tool) else {
            let err = AgentError::ToolNotFound(call.tool.clone());
            warn!("{}", err);
            self.terminal.println(&format!("⚠️  {}", err));
            return err.to_tool_result();
        };

        let empty = Map::new();
        let args = match &call.args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                let err = AgentError::InvalidArguments {
                    tool: call.tool.clone(),
                    reason: format!("expected a JSON object, got {}", other),
                };
                warn!("{}", err);
                self.terminal.println(&format!("⚠️  {}", err));
                return err.to_tool_result();
            }
        };

        let ctx = ToolContext {
            cancellation: cancellation.child_token(),
            terminal: self.terminal.clone(),
            working_dir: self.working_dir.clone(),
        };

        match self.executor.execute_with_feedback(tool.as_ref(), args, &ctx).await {
            Ok(output) => output,
            Err(err) => err.to_tool_result(),
        }
    }
}

/// Give every call a non-empty id so results can be correlated.
fn with_call_ids(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.trim().is_empty() {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
            call
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_call_ids_are_synthesised() {
        let calls = with_call_ids(vec![
            ToolCall::new("", "shell", json!({})),
            ToolCall::new("keep", "shell", json!({})),
            ToolCall::new("", "shell", json!({})),
        ]);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[1].id, "keep");
        assert_ne!(calls[0].id, calls[2].id);
    }
}
