use super::{parameters_schema, FilesystemTool, ShellTool, SystemInfoTool, Tool, WebFetchTool};
use kiwi_config::Config;
use kiwi_providers::ToolDefinition;
use std::sync::Arc;

/// Tools available to the model, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell, filesystem, system info and web fetch, configured from `config`.
    pub fn standard(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(ShellTool::new(&config.agent.shell, config.llm.safe_mode));
        registry.register(FilesystemTool);
        registry.register(SystemInfoTool);
        registry.register(WebFetchTool::new());
        registry
    }

    /// Add a tool, replacing any existing tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: parameters_schema(&tool.parameters()),
            })
            .collect()
    }

    /// Plain-text listing for system prompts.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for tool in &self.tools {
            out.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
            for param in tool.parameters() {
                let requirement = if param.required { "required" } else { "optional" };
                out.push_str(&format!("    {} ({}, {}): {}", param.name, param.kind, requirement, param.description));
                if let Some(allowed) = param.allowed {
                    out.push_str(&format!(" [{}]", allowed.join(", ")));
                }
                out.push('\n');
            }
        }
        out
    }
}
