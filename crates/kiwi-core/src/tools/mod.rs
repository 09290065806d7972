//! Tools the model can invoke.
//!
//! - `shell` - run a command line through the subprocess runner
//! - `filesystem` - list directories and read files under the working directory
//! - `system_info` - host, memory and environment details
//! - `webfetch` - fetch a URL over HTTP(S)

pub mod filesystem;
pub mod registry;
pub mod shell;
pub mod system_info;
pub mod webfetch;

pub use filesystem::FilesystemTool;
pub use registry::ToolRegistry;
pub use shell::ShellTool;
pub use system_info::SystemInfoTool;
pub use webfetch::WebFetchTool;

use crate::error::ToolError;
use crate::terminal::TerminalCoordinator;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub cancellation: CancellationToken,
    pub terminal: Arc<TerminalCoordinator>,
    pub working_dir: PathBuf,
}

/// Method name, progress steps and output of one tool invocation.
///
/// `output` is only ever set by the executor, and only on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolExecutionResult {
    pub method_name: String,
    pub steps: Vec<String>,
    pub output: Option<String>,
}

impl ToolExecutionResult {
    pub fn add_step(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }
}

/// One entry of a tool's argument schema.
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub allowed: Option<&'static [&'static str]>,
}

impl ToolParameter {
    pub fn required(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
            allowed: None,
        }
    }

    pub fn optional(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = Some(allowed);
        self
    }
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ToolParameter>;

    /// Whether the user must approve each invocation.
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Argument shown verbatim in the confirmation dialog (e.g. `command`).
    fn primary_argument(&self) -> Option<&str> {
        None
    }

    /// Run once. Steps may be recorded in `result` even when this fails.
    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
        result: &mut ToolExecutionResult,
    ) -> Result<String, ToolError>;
}

/// JSON schema (`{type: object, properties, required}`) for a tool's arguments.
pub fn parameters_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in parameters {
        let mut property = Map::new();
        property.insert("type".into(), Value::String(param.kind.to_string()));
        property.insert("description".into(), Value::String(param.description.to_string()));
        if let Some(allowed) = param.allowed {
            property.insert(
                "enum".into(),
                Value::Array(allowed.iter().map(|v| Value::String(v.to_string())).collect()),
            );
        }
        properties.insert(param.name.to_string(), Value::Object(property));
        if param.required {
            required.push(Value::String(param.name.to_string()));
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Fetch a required string argument.
pub(crate) fn string_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    match args.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(ToolError::InvalidArguments(format!("'{}' must not be empty", name))),
        Some(_) => Err(ToolError::InvalidArguments(format!("'{}' must be a string", name))),
        None => Err(ToolError::InvalidArguments(format!("missing required argument '{}'", name))),
    }
}

/// Fetch an optional string argument, falling back to `default`.
pub(crate) fn optional_string_arg<'a>(
    args: &'a Map<String, Value>,
    name: &str,
    default: &'a str,
) -> Result<&'a str, ToolError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(_) => string_arg(args, name),
    }
}

/// Length of the longest prefix of `bytes`, at most `limit` long, that does
/// not split a UTF-8 sequence at the cut.
pub(crate) fn utf8_prefix_len(bytes: &[u8], limit: usize) -> usize {
    if bytes.len() <= limit {
        return bytes.len();
    }
    let mut cut = limit;
    // A sequence is at most four bytes: back off over up to three continuations.
    while cut > 0 && limit - cut < 3 && (bytes[cut] & 0xC0) == 0x80 {
        cut -= 1;
    }
    cut
}
