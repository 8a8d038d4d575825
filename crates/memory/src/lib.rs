//! Conversation memory: utterances → embedded → persisted in a vector index.

pub mod embeddings;
pub mod embeddings_openai;
pub mod error;
pub mod store;
pub mod store_pinecone;
