use kiwi_core::{AgentError, ConversationOrchestrator, Message, TurnResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::display::{print_cancelled, print_metrics, print_turn_error};

/// Run one turn, cancelling it on Ctrl-C.
///
/// The turn is not dropped on cancellation: a running command is stopped
/// and its result recorded before the orchestrator returns
/// [`AgentError::Cancelled`].
pub async fn run_cancellable(
    orchestrator: &ConversationOrchestrator,
    messages: &mut Vec<Message>,
) -> Result<TurnResult, AgentError> {
    let cancellation = CancellationToken::new();
    let turn = orchestrator.run_with_cancellation(messages, cancellation.clone());
    tokio::pin!(turn);

    tokio::select! {
        result = &mut turn => return result,
        Ok(()) = tokio::signal::ctrl_c() => {
            debug!("Ctrl-C during turn, cancelling");
        }
    }

    cancellation.cancel();
    turn.await
}

/// Append `input` as a user message and run one turn over `messages`.
///
/// Errors are printed and logged; the conversation stays usable either way.
pub async fn execute_turn(
    orchestrator: &ConversationOrchestrator,
    messages: &mut Vec<Message>,
    input: &str,
    show_metrics: bool,
) -> Option<TurnResult> {
    messages.push(Message::user(input));

    match run_cancellable(orchestrator, messages).await {
        Ok(result) => {
            if show_metrics {
                print_metrics(&result.metrics, &orchestrator.label());
            }
            Some(result)
        }
        Err(AgentError::Cancelled) => {
            print_cancelled();
            None
        }
        Err(e) => {
            error!("Turn failed: {}", e);
            print_turn_error(&e);
            None
        }
    }
}
