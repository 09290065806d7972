//! Read-only filesystem access confined to the working and temp directories.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::{optional_string_arg, string_arg, utf8_prefix_len, Tool, ToolContext, ToolExecutionResult, ToolParameter};
use crate::error::ToolError;

/// Reads beyond this many bytes are cut off.
pub const MAX_READ_BYTES: usize = 1024 * 1024;
const TRUNCATION_NOTICE: &str = "\n... (file truncated)";

pub struct FilesystemTool;

/// Resolve `requested` against `working_dir` and make sure it stays inside
/// the working directory or the system temp dir.
fn resolve_path(working_dir: &Path, requested: &str) -> Result<PathBuf, ToolError> {
    let expanded = PathBuf::from(shellexpand::tilde(requested).as_ref());
    let candidate = if expanded.is_absolute() {
        expanded
    } else {
        working_dir.join(expanded)
    };

    let resolved = candidate
        .canonicalize()
        .map_err(|e| ToolError::InvalidArguments(format!("cannot access '{}': {}", requested, e)))?;

    let roots = [working_dir.to_path_buf(), std::env::temp_dir()];
    let allowed = roots
        .iter()
        .filter_map(|root| root.canonicalize().ok())
        .any(|root| resolved.starts_with(&root));

    if !allowed {
        return Err(ToolError::InvalidArguments(format!(
            "'{}' is outside the working directory",
            requested
        )));
    }
    Ok(resolved)
}

async fn list_dir(path: &Path, result: &mut ToolExecutionResult) -> Result<String, ToolError> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| ToolError::Failed(format!("failed to list {}: {}", path.display(), e)))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ToolError::Failed(format!("failed to list {}: {}", path.display(), e)))?
    {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    result.add_step(format!("Listed {} entries in {}", names.len(), path.display()));
    let mut output = names.join("\n");
    if !output.is_empty() {
        output.push('\n');
    }
    Ok(output)
}

async fn read_file(path: &Path, result: &mut ToolExecutionResult) -> Result<String, ToolError> {
    if path.is_dir() {
        return Err(ToolError::InvalidArguments(format!("{} is a directory", path.display())));
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ToolError::Failed(format!("failed to read {}: {}", path.display(), e)))?;

    let truncated = bytes.len() > MAX_READ_BYTES;
    let shown = &bytes[..utf8_prefix_len(&bytes, MAX_READ_BYTES)];
    let mut content = String::from_utf8_lossy(shown).into_owned();

    result.add_step(format!("Read {} bytes from {}", bytes.len(), path.display()));
    if truncated {
        content.push_str(TRUNCATION_NOTICE);
        result.add_step(format!("Truncated to {} bytes", MAX_READ_BYTES));
    }
    Ok(content)
}

#[async_trait::async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "List a directory or read a file inside the working directory"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("operation", "string", "Operation to perform").one_of(&["list", "read"]),
            ToolParameter::optional("path", "string", "File or directory path (defaults to the working directory)"),
        ]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
        result: &mut ToolExecutionResult,
    ) -> Result<String, ToolError> {
        let operation = string_arg(args, "operation")?;
        let requested = optional_string_arg(args, "path", ".")?;
        result.method_name = operation.to_string();

        let path = resolve_path(&ctx.working_dir, requested)?;
        match operation {
            "list" => list_dir(&path, result).await,
            "read" => read_file(&path, result).await,
            other => Err(ToolError::InvalidArguments(format!(
                "unknown operation '{}', expected 'list' or 'read'",
                other
            ))),
        }
    }
}
