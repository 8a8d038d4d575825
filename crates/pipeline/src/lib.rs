//! Retrieval-augmented streaming completion pipeline.
//!
//! One invocation embeds the newest turn, records it in vector memory,
//! retrieves similar history, streams the provider's reply to the caller,
//! and writes the finished reply back to memory.

pub mod augment;
pub mod credentials;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod relay;
pub mod sse;

#[cfg(test)]
pub(crate) mod testing;
