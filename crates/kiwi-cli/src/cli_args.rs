//! CLI argument parsing for kiwi.

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(name = "kiwi")]
#[command(about = "A terminal agent that lets a language model run tools on your machine")]
#[command(version)]
pub struct Cli {
    /// Task to execute (if provided, runs once instead of interactively)
    pub task: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the configured provider
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Override the model for the selected provider
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Wait for complete model replies instead of streaming them
    #[arg(long)]
    pub no_streaming: bool,

    /// Run shell commands without asking for confirmation
    #[arg(long = "unsafe")]
    pub unsafe_mode: bool,

    /// Print token and timing metrics after each turn
    #[arg(long)]
    pub debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_is_positional() {
        let cli = Cli::parse_from(["kiwi", "list files in /tmp"]);
        assert_eq!(cli.task.as_deref(), Some("list files in /tmp"));
        assert!(!cli.unsafe_mode);
        assert!(!cli.no_streaming);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "kiwi",
            "--provider",
            "mock",
            "--model",
            "m1",
            "--no-streaming",
            "--unsafe",
            "--debug",
            "-v",
            "-c",
            "~/kiwi.toml",
        ]);
        assert!(cli.task.is_none());
        assert_eq!(cli.provider.as_deref(), Some("mock"));
        assert_eq!(cli.model.as_deref(), Some("m1"));
        assert_eq!(cli.config.as_deref(), Some("~/kiwi.toml"));
        assert!(cli.no_streaming && cli.unsafe_mode && cli.debug && cli.verbose);
    }
}
