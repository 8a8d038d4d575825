//! In-memory fakes for the embedding and store seams, shared by unit tests.
#![allow(clippy::unwrap_used)]

use std::sync::Mutex;

use async_trait::async_trait;

use recall_memory::{
    embeddings::EmbeddingProvider,
    error::MemoryError,
    store::{MemoryMatch, MemoryStore, RecordMetadata},
};

pub(crate) struct FixedEmbeddings;

#[async_trait]
impl EmbeddingProvider for FixedEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(vec![0.1, 0.2, 0.3])
    }

    fn model_name(&self) -> &str {
        "fixed-embedding"
    }

    fn dimensions(&self) -> usize {
        3
    }
}

pub(crate) struct FailingEmbeddings;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        Err(MemoryError::Upstream {
            status: 500,
            body: "embedding endpoint down".into(),
        })
    }

    fn model_name(&self) -> &str {
        "failing-embedding"
    }

    fn dimensions(&self) -> usize {
        3
    }
}

#[derive(Default)]
pub(crate) struct RecordingStore {
    pub upserts: Mutex<Vec<(String, String)>>,
    pub matches: Vec<MemoryMatch>,
    pub fail_upsert: bool,
    pub fail_query: bool,
}

impl RecordingStore {
    pub fn with_matches(matches: Vec<MemoryMatch>) -> Self {
        Self {
            matches,
            ..Default::default()
        }
    }

    pub fn match_row(speaker: &str, timestamp: &str, message: &str) -> MemoryMatch {
        MemoryMatch {
            id: "m".into(),
            score: 0.9,
            metadata: RecordMetadata {
                speaker: speaker.into(),
                message: message.into(),
                timestamp: timestamp.into(),
            },
        }
    }
}

#[async_trait]
impl MemoryStore for RecordingStore {
    async fn upsert(
        &self,
        speaker: &str,
        message: &str,
        _vector: &[f32],
    ) -> Result<(), MemoryError> {
        if self.fail_upsert {
            return Err(MemoryError::Upstream {
                status: 500,
                body: "store down".into(),
            });
        }
        self.upserts
            .lock()
            .unwrap()
            .push((speaker.to_string(), message.to_string()));
        Ok(())
    }

    async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<MemoryMatch>, MemoryError> {
        if self.fail_query {
            return Err(MemoryError::Upstream {
                status: 500,
                body: "store down".into(),
            });
        }
        Ok(self.matches.clone())
    }
}
