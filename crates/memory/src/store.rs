/// Storage abstraction for conversation memory records.
use async_trait::async_trait;

use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Metadata attached to every memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub speaker: String,
    pub message: String,
    /// ISO-8601 instant at which the record was written.
    pub timestamp: String,
}

/// One similarity match returned by a query. Raw vectors are never echoed
/// back; only the metadata travels.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    pub metadata: RecordMetadata,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Record one utterance. Always creates a new record under a fresh id;
    /// the memory is an append-only log of utterances, not a deduplicated
    /// index.
    async fn upsert(
        &self,
        speaker: &str,
        message: &str,
        vector: &[f32],
    ) -> Result<(), MemoryError>;

    /// Return the `top_k` nearest records to `vector`, best first. Ranking is
    /// delegated to the store's similarity metric.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<MemoryMatch>, MemoryError>;
}
