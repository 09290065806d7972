use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use super::{string_arg, utf8_prefix_len, Tool, ToolContext, ToolExecutionResult, ToolParameter};
use crate::error::ToolError;

pub const DEFAULT_MAX_BYTES: usize = 64 * 1024;
pub const MAX_BYTES_LIMIT: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_url(raw: &str) -> Result<reqwest::Url, ToolError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ToolError::InvalidArguments(format!(
            "unsupported scheme '{}', only http and https are allowed",
            scheme
        ))),
    }
}

fn max_bytes(args: &Map<String, Value>) -> Result<usize, ToolError> {
    match args.get("max_bytes") {
        None | Some(Value::Null) => Ok(DEFAULT_MAX_BYTES),
        Some(value) => value
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| (n as usize).min(MAX_BYTES_LIMIT))
            .ok_or_else(|| ToolError::InvalidArguments("'max_bytes' must be a positive integer".into())),
    }
}

#[async_trait::async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "webfetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page or API response over HTTP(S) and return the body as text"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("url", "string", "The http or https URL to fetch"),
            ToolParameter::optional("max_bytes", "integer", "Maximum body bytes to return (default 65536)"),
        ]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
        result: &mut ToolExecutionResult,
    ) -> Result<String, ToolError> {
        let url = parse_url(string_arg(args, "url")?)?;
        let limit = max_bytes(args)?;
        result.method_name = "get".to_string();
        debug!("Fetching {}", url);

        let request = self.client.get(url.clone()).timeout(REQUEST_TIMEOUT).send();
        let mut response = tokio::select! {
            response = request => response.map_err(|e| ToolError::Failed(format!("request failed: {}", e)))?,
            _ = ctx.cancellation.cancelled() => return Err(cancelled()),
        };

        let status = response.status();
        result.add_step(format!("GET {} -> {}", url, status));
        if !status.is_success() {
            return Err(ToolError::Failed(format!("HTTP {}", status)));
        }

        // Read a few bytes past the limit so the cut can see a split character.
        let keep = limit + 4;
        let mut body = Vec::with_capacity(keep.min(DEFAULT_MAX_BYTES + 4));
        while body.len() < keep {
            let chunk = tokio::select! {
                chunk = response.chunk() => {
                    chunk.map_err(|e| ToolError::Failed(format!("failed to read body: {}", e)))?
                }
                _ = ctx.cancellation.cancelled() => return Err(cancelled()),
            };
            let Some(chunk) = chunk else { break };
            let take = chunk.len().min(keep - body.len());
            body.extend_from_slice(&chunk[..take]);
        }

        let truncated = body.len() > limit;
        let shown = &body[..utf8_prefix_len(&body, limit)];
        let mut text = String::from_utf8_lossy(shown).into_owned();
        result.add_step(format!("Received {} bytes", shown.len()));
        if truncated {
            text.push_str(&format!("\n... (truncated to {} bytes)", limit));
        }
        Ok(text)
    }
}

fn cancelled() -> ToolError {
    ToolError::Failed("request cancelled".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::TerminalCoordinator;
    use crate::ui_writer::NullUiWriter;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    fn ctx(cancellation: CancellationToken) -> ToolContext {
        ToolContext {
            cancellation,
            terminal: Arc::new(TerminalCoordinator::new(Arc::new(NullUiWriter))),
            working_dir: std::env::temp_dir(),
        }
    }

    /// Serve one request: headers announcing `length` bytes, then `body`,
    /// then hold the connection open until the client goes away.
    async fn serve_once(length: usize, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", length);
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            let mut rest = [0u8; 16];
            let _ = socket.read(&mut rest).await;
        });
        format!("http://{}/page", addr)
    }

    async fn fetch(args: Value, cancellation: CancellationToken) -> Result<String, ToolError> {
        let mut result = ToolExecutionResult::default();
        let tool = WebFetchTool {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        };
        tool.execute(args.as_object().unwrap(), &ctx(cancellation), &mut result)
            .await
    }

    #[tokio::test]
    async fn test_body_truncated_on_character_boundary() {
        let body = format!("x{}", "é".repeat(50)).into_bytes();
        let url = serve_once(body.len(), body).await;

        let text = fetch(json!({"url": url, "max_bytes": 10}), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, format!("x{}\n... (truncated to 10 bytes)", "é".repeat(4)));
    }

    #[tokio::test]
    async fn test_short_body_is_returned_whole() {
        let url = serve_once(5, b"hello".to_vec()).await;
        let text = fetch(json!({"url": url}), CancellationToken::new()).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_cancellation_while_reading_body() {
        // Announce more than is ever sent so the read stalls.
        let url = serve_once(1000, b"partial".to_vec()).await;
        let cancellation = CancellationToken::new();
        let trigger = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = fetch(json!({"url": url}), cancellation).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(started.elapsed() < REQUEST_TIMEOUT);
    }

    #[test]
    fn test_url_validation() {
        assert!(parse_url("https://example.com/a").is_ok());
        assert!(matches!(parse_url("file:///etc/passwd"), Err(ToolError::InvalidArguments(_))));
        assert!(matches!(parse_url("not a url"), Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn test_max_bytes_bounds() {
        let args = json!({});
        assert_eq!(max_bytes(args.as_object().unwrap()).unwrap(), DEFAULT_MAX_BYTES);

        let args = json!({"max_bytes": 10_000_000});
        assert_eq!(max_bytes(args.as_object().unwrap()).unwrap(), MAX_BYTES_LIMIT);

        let args = json!({"max_bytes": "lots"});
        assert!(max_bytes(args.as_object().unwrap()).is_err());
    }
}
