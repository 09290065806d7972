//! Errors an adapter may surface while streaming or completing.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The model ended its turn without any content. Some vendors do this
    /// right after issuing a tool call.
    #[error("model returned null content")]
    NullContent,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("request exceeds the model context window")]
    ContextTooLarge,
}

/// True when `err`, or anything in its cause chain, is [`ProviderError::NullContent`].
pub fn is_null_content_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ProviderError>(),
            Some(ProviderError::NullContent)
        )
    })
}
