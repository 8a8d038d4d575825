use recall_memory::error::MemoryError;
use thiserror::Error;

/// Caller-visible failures of one pipeline invocation.
///
/// Completion-provider failures discovered after the output stream has opened
/// are surfaced in band as stream text instead (see [`crate::relay`]).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither the request payload nor the server configuration supplied the
    /// named credential.
    #[error(
        "missing {0}. Add it on the client side (Settings icon) or server side (your deployment)."
    )]
    MissingCredential(&'static str),

    /// Embedding the current message failed; the turn cannot be recorded.
    #[error("failed to embed message: {0}")]
    Embedding(#[source] MemoryError),

    /// Writing the current message to the memory store failed. Continuing
    /// would silently skip recording the turn, so the whole invocation fails.
    #[error("failed to record message in memory: {0}")]
    Store(#[source] MemoryError),

    /// The caller cancelled before the completion request was issued.
    #[error("request aborted by the caller")]
    Aborted,
}
