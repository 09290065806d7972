use serde_json::{Map, Value};
use sysinfo::System;

use super::{optional_string_arg, Tool, ToolContext, ToolExecutionResult, ToolParameter};
use crate::error::ToolError;

const SENSITIVE_MARKERS: [&str; 9] = [
    "KEY", "SECRET", "PASSWORD", "TOKEN", "CREDENTIAL", "PRIVATE", "AUTH", "ACCESS", "API_KEY",
];

const MIB: u64 = 1024 * 1024;

pub struct SystemInfoTool;

fn is_sensitive(name: &str) -> bool {
    let upper = name.to_uppercase();
    SENSITIVE_MARKERS.iter().any(|marker| upper.contains(marker))
}

fn basic_info(ctx: &ToolContext, result: &mut ToolExecutionResult) -> String {
    let mut sys = System::new();
    sys.refresh_cpu();

    let unknown = || "unknown".to_string();
    let lines = [
        format!("OS: {}", System::long_os_version().unwrap_or_else(unknown)),
        format!("Kernel: {}", System::kernel_version().unwrap_or_else(unknown)),
        format!("Hostname: {}", System::host_name().unwrap_or_else(unknown)),
        format!("Architecture: {}", std::env::consts::ARCH),
        format!("CPUs: {}", sys.cpus().len()),
        format!("Working directory: {}", ctx.working_dir.display()),
    ];
    result.add_step("Collected host details");
    lines.join("\n") + "\n"
}

fn memory_info(result: &mut ToolExecutionResult) -> String {
    let mut sys = System::new();
    sys.refresh_memory();

    result.add_step("Collected memory usage");
    format!(
        "Total memory: {} MiB\nUsed memory: {} MiB\nAvailable memory: {} MiB\nTotal swap: {} MiB\nUsed swap: {} MiB\n",
        sys.total_memory() / MIB,
        sys.used_memory() / MIB,
        sys.available_memory() / MIB,
        sys.total_swap() / MIB,
        sys.used_swap() / MIB,
    )
}

fn env_info<I>(vars: I, result: &mut ToolExecutionResult) -> String
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut hidden = 0;
    let mut visible: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(name, _)| {
            let sensitive = is_sensitive(name);
            if sensitive {
                hidden += 1;
            }
            !sensitive
        })
        .collect();
    visible.sort();

    result.add_step(format!("Listed {} environment variables", visible.len()));
    if hidden > 0 {
        result.add_step(format!("Hid {} sensitive variables", hidden));
    }

    visible
        .into_iter()
        .map(|(name, value)| format!("{}={}\n", name, value))
        .collect()
}

#[async_trait::async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Report operating system, memory or environment details of this machine"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::optional("type", "string", "Kind of information (defaults to basic)")
            .one_of(&["basic", "memory", "env"])]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
        result: &mut ToolExecutionResult,
    ) -> Result<String, ToolError> {
        let kind = optional_string_arg(args, "type", "basic")?;
        result.method_name = kind.to_string();

        match kind {
            "basic" => Ok(basic_info(ctx, result)),
            "memory" => Ok(memory_info(result)),
            "env" => Ok(env_info(std::env::vars(), result)),
            other => Err(ToolError::InvalidArguments(format!(
                "unknown type '{}', expected basic, memory or env",
                other
            ))),
        }
    }
}
