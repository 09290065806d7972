//! Shell command execution tool.

use serde_json::{Map, Value};
use tracing::debug;

use super::{string_arg, Tool, ToolContext, ToolExecutionResult, ToolParameter};
use crate::error::ToolError;
use crate::subprocess::SubprocessRunner;

pub struct ShellTool {
    shell: String,
    requires_confirmation: bool,
}

impl ShellTool {
    pub fn new(shell: &str, requires_confirmation: bool) -> Self {
        Self {
            shell: shell.to_string(),
            requires_confirmation,
        }
    }
}

/// First word of the command line, used as the method name in summaries.
fn method_name(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .unwrap_or("execute")
        .to_string()
}

#[async_trait::async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a command line in the user's shell and return its combined stdout and stderr"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required("command", "string", "The command line to execute")]
    }

    fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }

    fn primary_argument(&self) -> Option<&str> {
        Some("command")
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
        result: &mut ToolExecutionResult,
    ) -> Result<String, ToolError> {
        let command = string_arg(args, "command")?;
        result.method_name = method_name(command);
        debug!("Running shell command: {}", command);

        let runner = SubprocessRunner::new(ctx.terminal.clone())
            .with_shell(&self.shell)
            .with_working_dir(&ctx.working_dir);

        match runner.run(command, &ctx.cancellation).await {
            Ok(output) => {
                result.add_step(format!(
                    "Command completed successfully with {} lines ({} bytes) of output",
                    output.lines().count(),
                    output.len()
                ));
                Ok(output)
            }
            Err(err) => {
                result.add_step(format!("Command execution failed: {}", err));
                Err(err.into())
            }
        }
    }
}
