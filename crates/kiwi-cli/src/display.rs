//! Display utilities for the kiwi CLI.
//!
//! Everything here prints outside a turn, when no indicator or tool output
//! can be active, so it writes to stdout directly.

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use kiwi_core::{AgentError, ResponseMetrics};
use std::path::Path;

/// Format a workspace path for display, replacing home directory with ~.
pub fn format_workspace_path(workspace_path: &Path) -> String {
    let path_str = workspace_path.display().to_string();
    dirs::home_dir()
        .and_then(|home| {
            path_str
                .strip_prefix(&home.display().to_string())
                .map(|s| format!("~{}", s))
        })
        .unwrap_or(path_str)
}

pub fn print_banner(label: &str, workspace_path: &Path, safe_mode: bool) {
    println!();
    println!("kiwi terminal agent");
    println!(
        "🔧 {}{}{} | {}",
        SetForegroundColor(Color::Cyan),
        label,
        ResetColor,
        format_workspace_path(workspace_path)
    );
    if !safe_mode {
        println!(
            "{}⚠️  Safe mode is off: shell commands run without confirmation{}",
            SetForegroundColor(Color::Yellow),
            ResetColor
        );
    }
    println!("Type 'exit' or 'quit' to leave.");
    println!();
}

pub fn print_metrics(metrics: &ResponseMetrics, label: &str) {
    println!(
        "{}{}{}",
        SetForegroundColor(Color::DarkGrey),
        metrics.format_summary(label),
        ResetColor
    );
}

/// One-line explanation of why a turn ended without an answer.
pub fn describe_turn_error(err: &AgentError) -> String {
    match err {
        AgentError::ToolLoopLimitExceeded { max_calls } => format!(
            "Stopped after {} model calls without a final answer. Try breaking the task into smaller steps.",
            max_calls
        ),
        AgentError::Transport(_) => format!("Could not reach the model: {}", err),
        AgentError::Cancelled => "Operation cancelled by user (Ctrl+C)".to_string(),
        other => other.to_string(),
    }
}

pub fn print_cancelled() {
    println!();
    println!(
        "{}⚠️  {}{}",
        SetForegroundColor(Color::Yellow),
        describe_turn_error(&AgentError::Cancelled),
        ResetColor
    );
}

pub fn print_turn_error(err: &AgentError) {
    println!(
        "{}❌ {}{}",
        SetForegroundColor(Color::Red),
        describe_turn_error(err),
        ResetColor
    );
}
