//! Scriptable provider for tests and offline runs.
//!
//! ```rust,ignore
//! use kiwi_providers::mock::{MockProvider, MockResponse};
//!
//! let provider = MockProvider::new().with_responses(vec![
//!     MockResponse::native_tool_call("shell", json!({"command": "ls"})),
//!     MockResponse::text("Here are your files."),
//! ]);
//! ```

use crate::{
    CompletionChunk, CompletionRequest, CompletionResponse, CompletionStream, LLMProvider,
    ProviderError, ToolCall, Usage,
};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

static TOOL_CALL_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_call_id() -> String {
    format!("call_{}", TOOL_CALL_COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One scripted model reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub chunks: Vec<MockChunk>,
    pub usage: Usage,
    /// When set, the request itself fails with this message before any chunk.
    pub failure: Option<String>,
}

/// A single chunk in a scripted stream.
#[derive(Debug, Clone)]
pub struct MockChunk {
    pub content: String,
    pub finished: bool,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub stop_reason: Option<String>,
    /// Emitted as a stream error in place of a chunk; ends the stream.
    pub error: Option<ProviderError>,
}

impl MockChunk {
    pub fn content(text: &str) -> Self {
        Self {
            content: text.to_string(),
            finished: false,
            tool_calls: None,
            stop_reason: None,
            error: None,
        }
    }

    pub fn finished(stop_reason: &str) -> Self {
        Self {
            finished: true,
            stop_reason: Some(stop_reason.to_string()),
            ..Self::content("")
        }
    }

    pub fn tool_call(tool: &str, args: serde_json::Value) -> Self {
        Self::tool_call_with_id(&next_call_id(), tool, args)
    }

    pub fn tool_call_with_id(id: &str, tool: &str, args: serde_json::Value) -> Self {
        Self {
            tool_calls: Some(vec![ToolCall::new(id, tool, args)]),
            ..Self::content("")
        }
    }

    pub fn error(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Self::content("")
        }
    }
}

fn usage_for(text: &str) -> Usage {
    Usage::new(100, text.len() as u32 / 4)
}

impl MockResponse {
    /// Text-only reply in a single chunk.
    pub fn text(content: &str) -> Self {
        Self {
            chunks: vec![MockChunk::content(content), MockChunk::finished("end_turn")],
            usage: usage_for(content),
            failure: None,
        }
    }

    /// Text-only reply delivered in several chunks.
    pub fn streaming(chunks: Vec<&str>) -> Self {
        let total: String = chunks.concat();
        let mut mock_chunks: Vec<MockChunk> = chunks.into_iter().map(MockChunk::content).collect();
        mock_chunks.push(MockChunk::finished("end_turn"));
        Self {
            chunks: mock_chunks,
            usage: usage_for(&total),
            failure: None,
        }
    }

    /// A single structured tool call.
    pub fn native_tool_call(tool: &str, args: serde_json::Value) -> Self {
        Self::native_tool_calls(vec![(tool, args)])
    }

    /// Several structured tool calls in one reply, in the given order.
    pub fn native_tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        let mut chunks: Vec<MockChunk> = calls
            .into_iter()
            .map(|(tool, args)| MockChunk::tool_call(tool, args))
            .collect();
        chunks.push(MockChunk::finished("tool_use"));
        Self {
            chunks,
            usage: Usage::new(100, 50),
            failure: None,
        }
    }

    pub fn text_then_native_tool(text: &str, tool: &str, args: serde_json::Value) -> Self {
        Self {
            chunks: vec![
                MockChunk::content(text),
                MockChunk::tool_call(tool, args),
                MockChunk::finished("tool_use"),
            ],
            usage: Usage::new(100, 50 + text.len() as u32 / 4),
            failure: None,
        }
    }

    /// A tool call followed by a null-content error instead of a proper end
    /// of turn, as some vendors do after a tool call.
    pub fn tool_call_then_null_content(tool: &str, args: serde_json::Value) -> Self {
        Self {
            chunks: vec![
                MockChunk::tool_call(tool, args),
                MockChunk::error(ProviderError::NullContent),
            ],
            usage: Usage::new(100, 10),
            failure: None,
        }
    }

    /// Text that mentions a tool run, then a null-content error.
    pub fn text_then_null_content(text: &str) -> Self {
        Self {
            chunks: vec![
                MockChunk::content(text),
                MockChunk::error(ProviderError::NullContent),
            ],
            usage: usage_for(text),
            failure: None,
        }
    }

    /// The request fails outright (network, auth, ...).
    pub fn transport_error(message: &str) -> Self {
        Self {
            chunks: Vec::new(),
            usage: Usage::default(),
            failure: Some(message.to_string()),
        }
    }

    pub fn custom(chunks: Vec<MockChunk>, usage: Usage) -> Self {
        Self {
            chunks,
            usage,
            failure: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// A provider that replays queued [`MockResponse`]s in FIFO order and
/// records every request it receives.
pub struct MockProvider {
    name: String,
    model: String,
    native_tool_calling: bool,
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    default_response: Option<MockResponse>,
    chunk_delay: std::time::Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            native_tool_calling: true,
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: None,
            chunk_delay: std::time::Duration::from_micros(100),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_native_tool_calling(mut self, enabled: bool) -> Self {
        self.native_tool_calling = enabled;
        self
    }

    pub fn with_response(self, response: MockResponse) -> Self {
        lock(&self.responses).push(response);
        self
    }

    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        lock(&self.responses).extend(responses);
        self
    }

    /// Reply used once the queue is empty.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    pub fn with_chunk_delay(mut self, delay: std::time::Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Shared handle to the recorded requests, usable after the provider
    /// has been moved into an agent.
    pub fn requests_handle(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.requests)
    }

    pub fn get_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_response(&self) -> MockResponse {
        let mut responses = lock(&self.responses);
        if responses.is_empty() {
            self.default_response
                .clone()
                .unwrap_or_else(|| MockResponse::text("Mock response (no responses configured)"))
        } else {
            responses.remove(0)
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        lock(&self.requests).push(request);
        let response = self.next_response();

        if let Some(message) = response.failure {
            anyhow::bail!("{}", message);
        }

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for chunk in response.chunks {
            if let Some(error) = chunk.error {
                return Err(error.into());
            }
            content.push_str(&chunk.content);
            if let Some(calls) = chunk.tool_calls {
                tool_calls.extend(calls);
            }
        }

        Ok(CompletionResponse {
            content,
            usage: response.usage,
            model: self.model.clone(),
            tool_calls,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        lock(&self.requests).push(request);
        let response = self.next_response();

        if let Some(message) = response.failure {
            anyhow::bail!("{}", message);
        }

        let usage = response.usage.clone();
        let delay = self.chunk_delay;
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            for chunk in response.chunks {
                if let Some(error) = chunk.error {
                    let _ = tx.send(Err(error.into())).await;
                    break;
                }

                let completion_chunk = CompletionChunk {
                    usage: if chunk.finished { Some(usage.clone()) } else { None },
                    content: chunk.content,
                    finished: chunk.finished,
                    tool_calls: chunk.tool_calls,
                    stop_reason: chunk.stop_reason,
                };

                if tx.send(Ok(completion_chunk)).await.is_err() {
                    break;
                }

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn has_native_tool_calling(&self) -> bool {
        self.native_tool_calling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_null_content_error;
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![], true)
    }

    #[tokio::test]
    async fn test_mock_provider_text_response() {
        let provider = MockProvider::new().with_response(MockResponse::text("Hello, world!"));

        let mut stream = provider.stream(request()).await.unwrap();
        let mut content = String::new();
        let mut finished = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            content.push_str(&chunk.content);
            if chunk.finished {
                finished = true;
                assert!(chunk.usage.is_some());
            }
        }

        assert_eq!(content, "Hello, world!");
        assert!(finished);
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_queue_order() {
        let provider = MockProvider::new().with_responses(vec![
            MockResponse::text("first"),
            MockResponse::text("second"),
        ]);

        assert_eq!(provider.complete(request()).await.unwrap().content, "first");
        assert_eq!(provider.complete(request()).await.unwrap().content, "second");
        assert!(provider
            .complete(request())
            .await
            .unwrap()
            .content
            .contains("no responses configured"));
    }

    #[tokio::test]
    async fn test_complete_aggregates_tool_calls() {
        let provider = MockProvider::new().with_response(MockResponse::native_tool_calls(vec![
            ("shell", json!({"command": "ls"})),
            ("filesystem", json!({"operation": "list", "path": "."})),
        ]));

        let response = provider.complete(request()).await.unwrap();
        let tools: Vec<&str> = response.tool_calls.iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(tools, vec!["shell", "filesystem"]);
        assert_ne!(response.tool_calls[0].id, response.tool_calls[1].id);
    }

    #[tokio::test]
    async fn test_stream_emits_null_content_error() {
        let provider = MockProvider::new()
            .with_response(MockResponse::tool_call_then_null_content("shell", json!({"command": "ls"})));

        let mut stream = provider.stream(request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(first.tool_calls.is_some());

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(is_null_content_error(&err));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_fails_request() {
        let provider = MockProvider::new().with_response(MockResponse::transport_error("connection refused"));
        let err = provider.stream(request()).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
