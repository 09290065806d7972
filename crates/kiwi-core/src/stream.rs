//! Consumption of streamed model output.
//!
//! [`StreamProcessor::consume`] buffers text for the terminal, collects
//! structured tool calls, and decides whether the model has started a tool
//! run. That decision matters for one case only: some providers end a
//! tool-call turn with a null-content error instead of a clean stop, and the
//! processor turns that error into a successful, canned reply.

use crate::terminal::TerminalCoordinator;
use kiwi_providers::{is_null_content_error, CompletionChunk, CompletionStream, ToolCall, Usage};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Reply used when a null-content error follows a tool call.
pub const NULL_CONTENT_RECOVERY_TEXT: &str = "Command executed successfully.";

pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;

/// Decides whether a stream shows evidence of a tool call.
pub trait ToolCallDetector: Send + Sync {
    /// `text` is everything received so far, including `chunk`.
    fn detect(&self, chunk: &CompletionChunk, text: &str) -> bool;
}

/// Best-effort text heuristic: looks for phrases the terminal prints around
/// tool runs. It matches any mention of the word "tool", so it can fire on
/// ordinary prose.
pub struct MarkerDetector;

const TOOL_MARKERS: [&str; 3] = ["tool", "executing:", "executed in"];

impl ToolCallDetector for MarkerDetector {
    fn detect(&self, _chunk: &CompletionChunk, text: &str) -> bool {
        let lower = text.to_lowercase();
        TOOL_MARKERS.iter().any(|marker| lower.contains(marker))
    }
}

/// Uses only the chunk's explicit `tool_calls` field.
pub struct StructuredDetector;

impl ToolCallDetector for StructuredDetector {
    fn detect(&self, chunk: &CompletionChunk, _text: &str) -> bool {
        chunk.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// Structured evidence first, text markers as a fallback.
pub struct CombinedDetector;

impl ToolCallDetector for CombinedDetector {
    fn detect(&self, chunk: &CompletionChunk, text: &str) -> bool {
        StructuredDetector.detect(chunk, text) || MarkerDetector.detect(chunk, text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    pub tool_detected: bool,
    pub full_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// A null-content error ended the stream after tool evidence.
    /// `full_text` and `tool_calls` hold what arrived before it.
    pub recovered: bool,
}

pub struct StreamProcessor {
    terminal: Arc<TerminalCoordinator>,
    detector: Box<dyn ToolCallDetector>,
    flush_threshold: usize,
}

impl StreamProcessor {
    pub fn new(terminal: Arc<TerminalCoordinator>) -> Self {
        Self {
            terminal,
            detector: Box::new(CombinedDetector),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn ToolCallDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold.max(1);
        self
    }

    /// Drain `stream`, handing buffered text to `on_chunk`.
    ///
    /// Text is flushed once the buffer reaches the threshold or a chunk ends
    /// a line. The terminal is moved to Idle before the first flush.
    pub async fn consume<F>(&self, mut stream: CompletionStream, mut on_chunk: F) -> anyhow::Result<StreamOutcome>
    where
        F: FnMut(&str),
    {
        let mut outcome = StreamOutcome::default();
        let mut buffer = String::new();
        let mut started = false;

        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    self.flush(&mut buffer, &mut started, &mut on_chunk).await;

                    if outcome.tool_detected && is_null_content_error(&err) {
                        warn!("Null content after tool call, treating as success");
                        outcome.recovered = true;
                        return Ok(outcome);
                    }

                    self.terminal.idle().await;
                    return Err(err);
                }
            };

            if let Some(calls) = &chunk.tool_calls {
                outcome.tool_calls.extend(calls.iter().cloned());
            }
            if let Some(usage) = &chunk.usage {
                outcome.usage = Some(usage.clone());
            }

            if !chunk.content.is_empty() {
                outcome.full_text.push_str(&chunk.content);
                buffer.push_str(&chunk.content);
                let ends_line = chunk.content.ends_with('\n') || chunk.content.ends_with('\r');
                if ends_line || buffer.len() >= self.flush_threshold {
                    self.flush(&mut buffer, &mut started, &mut on_chunk).await;
                }
            }

            if !outcome.tool_detected && self.detector.detect(&chunk, &outcome.full_text) {
                debug!("Tool call detected in stream");
                outcome.tool_detected = true;
            }

            if chunk.finished {
                break;
            }
        }

        self.flush(&mut buffer, &mut started, &mut on_chunk).await;
        Ok(outcome)
    }

    async fn flush<F>(&self, buffer: &mut String, started: &mut bool, on_chunk: &mut F)
    where
        F: FnMut(&str),
    {
        if buffer.is_empty() {
            return;
        }
        if !*started {
            self.terminal.idle().await;
            *started = true;
        }
        on_chunk(buffer);
        buffer.clear();
    }
}

/// Rough classification of a finished reply's text, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionState {
    pub executed: bool,
    pub failed: bool,
    /// Text after the last "Output:" marker, if any.
    pub output: Option<String>,
}

const FAILURE_MARKERS: [&str; 3] = ["execution failed", "failed:", "all 3 attempts failed"];

impl ExecutionState {
    pub fn from_response(text: &str) -> Self {
        let lower = text.to_lowercase();
        let output = text
            .rfind("Output:")
            .map(|idx| text[idx + "Output:".len()..].trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            executed: lower.contains("executing:") || lower.contains("executed in"),
            failed: FAILURE_MARKERS.iter().any(|marker| lower.contains(marker)),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_writer::NullUiWriter;
    use kiwi_providers::{MockChunk, MockProvider, MockResponse, LLMProvider, CompletionRequest, ProviderError, Usage};
    use serde_json::json;
    use std::time::Duration;

    fn processor() -> StreamProcessor {
        let terminal = Arc::new(TerminalCoordinator::new(Arc::new(NullUiWriter)).with_min_dwell(Duration::ZERO));
        StreamProcessor::new(terminal)
    }

    async fn stream_of(response: MockResponse) -> CompletionStream {
        MockProvider::new()
            .with_response(response)
            .stream(CompletionRequest::new(vec![], true))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_small_chunks_are_buffered_until_newline() {
        let stream = stream_of(MockResponse::streaming(vec!["Hel", "lo", " world\n", "bye"])).await;
        let mut flushes = Vec::new();
        let outcome = processor().consume(stream, |text| flushes.push(text.to_string())).await.unwrap();

        assert_eq!(flushes, vec!["Hello world\n".to_string(), "bye".to_string()]);
        assert_eq!(outcome.full_text, "Hello world\nbye");
        assert!(!outcome.tool_detected);
        assert!(outcome.usage.is_some());
    }

    #[tokio::test]
    async fn test_threshold_forces_flush() {
        let long = "x".repeat(60);
        let stream = stream_of(MockResponse::streaming(vec![&long, &long, "y"])).await;
        let mut flushes = Vec::new();
        processor()
            .with_flush_threshold(100)
            .consume(stream, |text| flushes.push(text.len()))
            .await
            .unwrap();

        assert_eq!(flushes, vec![120, 1]);
    }

    #[tokio::test]
    async fn test_structured_tool_calls_collected() {
        let stream = stream_of(MockResponse::text_then_native_tool("Let me look.", "shell", json!({"command": "ls"}))).await;
        let outcome = processor()
            .with_detector(Box::new(StructuredDetector))
            .consume(stream, |_| {})
            .await
            .unwrap();

        assert!(outcome.tool_detected);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].tool, "shell");
    }

    #[tokio::test]
    async fn test_null_content_after_tool_is_recovered() {
        let stream = stream_of(MockResponse::tool_call_then_null_content("shell", json!({"command": "ls"}))).await;
        let outcome = processor().consume(stream, |_| {}).await.unwrap();

        assert!(outcome.recovered);
        assert!(outcome.full_text.is_empty());
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].args["command"], "ls");
    }

    #[tokio::test]
    async fn test_null_content_recovered_from_text_markers() {
        let stream = stream_of(MockResponse::text_then_null_content("🔧 [Tool: shell:ls] executed in 0.010s\n")).await;
        let outcome = processor()
            .with_detector(Box::new(MarkerDetector))
            .consume(stream, |_| {})
            .await
            .unwrap();
        assert!(outcome.recovered);
        assert!(outcome.full_text.starts_with("🔧 [Tool: shell:ls]"));
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_null_content_without_tool_propagates() {
        let stream = stream_of(MockResponse::text_then_null_content("Just chatting.")).await;
        let err = processor().consume(stream, |_| {}).await.unwrap_err();
        assert!(is_null_content_error(&err));
    }

    #[tokio::test]
    async fn test_other_errors_propagate_even_after_tool() {
        let response = MockResponse::custom(
            vec![
                MockChunk::tool_call("shell", json!({"command": "ls"})),
                MockChunk::error(ProviderError::RateLimited),
            ],
            Usage::default(),
        );
        let stream = stream_of(response).await;
        let err = processor().consume(stream, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_marker_detector() {
        let chunk = CompletionChunk::default();
        assert!(MarkerDetector.detect(&chunk, "Executing: ls -la"));
        assert!(MarkerDetector.detect(&chunk, "[Tool: shell] done"));
        assert!(!MarkerDetector.detect(&chunk, "The answer is 42."));
    }

    #[test]
    fn test_execution_state() {
        let state = ExecutionState::from_response("🔧 [Tool: shell:ls] executed in 0.1s\nOutput: a.txt");
        assert!(state.executed);
        assert!(!state.failed);
        assert_eq!(state.output.as_deref(), Some("a.txt"));

        let state = ExecutionState::from_response("  → All 3 attempts failed. Last error: boom");
        assert!(state.failed);
        assert!(state.output.is_none());
    }
}
