//! System prompts.

use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Conversational use from the interactive prompt
    Assistant,
    /// A single task given on the command line
    Execute,
}

const BASE_PROMPT: &str = "You are kiwi, an assistant running in the user's terminal. \
You can call tools to inspect and change the user's machine. \
Call a tool whenever the answer depends on the actual state of the system rather than guessing. \
Each tool result is returned to you as a message; read it before deciding the next step. \
When a tool fails, look at the error text and either fix the call or explain the problem. \
Keep final answers short and plain; the user is reading them in a terminal.";

const ASSISTANT_PROMPT: &str = "The user is chatting with you interactively and may follow up. \
Ask before taking an action whose effect you cannot undo.";

const EXECUTE_PROMPT: &str = "The user gave you one task from the command line. \
Carry it out end to end with as few tool calls as needed, then report what you did and the result.";

/// Full system prompt for `mode`, with the available tools listed.
pub fn system_prompt(mode: PromptMode, tools: &ToolRegistry) -> String {
    let mode_prompt = match mode {
        PromptMode::Assistant => ASSISTANT_PROMPT,
        PromptMode::Execute => EXECUTE_PROMPT,
    };

    let mut prompt = format!("{}\n\n{}", BASE_PROMPT, mode_prompt);
    if !tools.is_empty() {
        prompt.push_str("\n\nAvailable tools:\n");
        prompt.push_str(&tools.describe());
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwi_config::Config;

    #[test]
    fn test_prompt_lists_tools() {
        let tools = ToolRegistry::standard(&Config::default());
        let prompt = system_prompt(PromptMode::Execute, &tools);
        assert!(prompt.contains(EXECUTE_PROMPT));
        assert!(prompt.contains("- shell:"));
    }

    #[test]
    fn test_prompt_without_tools() {
        let prompt = system_prompt(PromptMode::Assistant, &ToolRegistry::new());
        assert!(!prompt.contains("Available tools"));
    }
}
