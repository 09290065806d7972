//! Interactive mode for the kiwi CLI.

use anyhow::Result;
use kiwi_core::{ConversationOrchestrator, Message};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error};

use crate::task_execution::execute_turn;

const PROMPT: &str = "kiwi> ";
const HISTORY_FILE: &str = ".kiwi_history";

fn is_exit_command(input: &str) -> bool {
    matches!(input, "exit" | "quit")
}

/// Read-eval loop. The conversation, starting with `system_prompt`, is kept
/// across turns until the user exits.
pub async fn run_interactive(
    orchestrator: &ConversationOrchestrator,
    system_prompt: String,
    show_metrics: bool,
) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let history_file = dirs::home_dir().map(|home| home.join(HISTORY_FILE));
    if let Some(ref history_path) = history_file {
        let _ = rl.load_history(history_path);
    }

    let mut messages = vec![Message::system(system_prompt)];

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if is_exit_command(input) {
                    break;
                }
                rl.add_history_entry(input)?;

                execute_turn(orchestrator, &mut messages, input, show_metrics).await;
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                debug!("Ctrl-C at prompt");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!("Error reading input: {}", e);
                break;
            }
        }
    }

    if let Some(ref history_path) = history_file {
        if let Err(e) = rl.save_history(history_path) {
            debug!("Could not save history to {}: {}", history_path.display(), e);
        }
    }
    println!("Goodbye!");
    Ok(())
}
