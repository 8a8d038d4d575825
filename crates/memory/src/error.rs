use thiserror::Error;

/// Failures talking to the embedding endpoint or the vector store.
///
/// Neither client retries: a failed call fails the enclosing phase, and the
/// caller decides whether that is fatal.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The upstream service answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The request never completed at the transport level.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream service answered 2xx but the payload was unusable.
    #[error("unexpected response payload: {0}")]
    UnexpectedPayload(&'static str),
}
