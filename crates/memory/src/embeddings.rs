/// Provider-agnostic embedding trait for generating vectors from text.
use async_trait::async_trait;

use crate::error::MemoryError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;

    /// The model name used by this provider (e.g. "text-embedding-ada-002").
    fn model_name(&self) -> &str;

    /// The dimensionality of the embeddings produced.
    fn dimensions(&self) -> usize;
}
