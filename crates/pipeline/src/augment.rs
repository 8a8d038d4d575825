/// Context augmentation: embed the newest turn, persist it, and prepend the
/// most similar prior turns to its content before completion.
use std::sync::Arc;

use tracing::{debug, warn};

use recall_memory::{embeddings::EmbeddingProvider, store::MemoryStore};

use crate::{error::PipelineError, model::ChatMessage};

/// Header line introducing retrieved history.
pub const CONTEXT_HEADER: &str = "HISTORIC CONTEXT:";
/// Separator line before the original message.
pub const NEW_MESSAGE_HEADER: &str = "NEW MESSAGE:";
/// How many nearest records a turn is enriched with.
pub const TOP_K: usize = 10;

pub struct ContextAugmenter {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn MemoryStore>,
}

impl ContextAugmenter {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>, store: Arc<dyn MemoryStore>) -> Self {
        Self { embeddings, store }
    }

    /// Rewrite the last message (the newest turn) so its content carries
    /// retrieved context; all other messages pass through unchanged.
    ///
    /// Embedding and persisting the turn are mandatory: if memory cannot
    /// accept the write, the invocation fails rather than silently skipping
    /// the record. A failed similarity lookup only degrades to an empty
    /// context block.
    pub async fn augment(
        &self,
        mut messages: Vec<ChatMessage>,
    ) -> Result<Vec<ChatMessage>, PipelineError> {
        let Some(last) = messages.last_mut() else {
            return Ok(messages);
        };

        let vector = self
            .embeddings
            .embed(&last.content)
            .await
            .map_err(PipelineError::Embedding)?;

        self.store
            .upsert(last.role.as_str(), &last.content, &vector)
            .await
            .map_err(PipelineError::Store)?;

        let matches = match self.store.query(&vector, TOP_K).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "similarity query failed, continuing without context");
                Vec::new()
            },
        };
        debug!(count = matches.len(), "retrieved similar messages");

        let mut lines = Vec::with_capacity(matches.len() + 3);
        lines.push(CONTEXT_HEADER.to_string());
        for m in &matches {
            lines.push(format!(
                "{} said on {}: {}",
                m.metadata.speaker, m.metadata.timestamp, m.metadata.message
            ));
        }
        lines.push(NEW_MESSAGE_HEADER.to_string());
        lines.push(std::mem::take(&mut last.content));
        last.content = lines.join("\n");

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{
        model::Role,
        testing::{FailingEmbeddings, FixedEmbeddings, RecordingStore},
    };

    fn message(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.into(),
        }
    }

    fn augmenter(store: Arc<RecordingStore>) -> ContextAugmenter {
        ContextAugmenter::new(Arc::new(FixedEmbeddings), store)
    }

    #[tokio::test]
    async fn injects_retrieved_context_in_fixed_order() {
        let store = Arc::new(RecordingStore::with_matches(vec![RecordingStore::match_row(
            "user",
            "T1",
            "Hi before",
        )]));
        let messages = augmenter(Arc::clone(&store))
            .augment(vec![message(Role::User, "Hello")])
            .await
            .unwrap();

        assert_eq!(
            messages[0].content,
            "HISTORIC CONTEXT:\nuser said on T1: Hi before\nNEW MESSAGE:\nHello"
        );
    }

    #[tokio::test]
    async fn records_the_turn_under_its_own_role() {
        let store = Arc::new(RecordingStore::default());
        augmenter(Arc::clone(&store))
            .augment(vec![message(Role::User, "Hello")])
            .await
            .unwrap();

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts.as_slice(), &[("user".to_string(), "Hello".to_string())]);
    }

    #[tokio::test]
    async fn only_the_last_message_is_rewritten() {
        let store = Arc::new(RecordingStore::default());
        let messages = augmenter(store)
            .augment(vec![
                message(Role::System, "You are helpful."),
                message(Role::User, "Hello"),
            ])
            .await
            .unwrap();

        assert_eq!(messages[0].content, "You are helpful.");
        assert_eq!(messages[1].content, "HISTORIC CONTEXT:\nNEW MESSAGE:\nHello");
    }

    #[tokio::test]
    async fn query_failure_degrades_to_empty_context() {
        let store = Arc::new(RecordingStore {
            fail_query: true,
            ..Default::default()
        });
        let messages = augmenter(store)
            .augment(vec![message(Role::User, "Hello")])
            .await
            .unwrap();

        assert_eq!(messages[0].content, "HISTORIC CONTEXT:\nNEW MESSAGE:\nHello");
    }

    #[tokio::test]
    async fn upsert_failure_is_fatal() {
        let store = Arc::new(RecordingStore {
            fail_upsert: true,
            ..Default::default()
        });
        let err = augmenter(store)
            .augment(vec![message(Role::User, "Hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)));
    }

    #[tokio::test]
    async fn embed_failure_is_fatal_and_writes_nothing() {
        let store = Arc::new(RecordingStore::default());
        let augmenter = ContextAugmenter::new(Arc::new(FailingEmbeddings), store.clone());
        let err = augmenter
            .augment(vec![message(Role::User, "Hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
        assert!(store.upserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_message_list_passes_through() {
        let store = Arc::new(RecordingStore::default());
        let messages = augmenter(Arc::clone(&store)).augment(Vec::new()).await.unwrap();
        assert!(messages.is_empty());
        assert!(store.upserts.lock().unwrap().is_empty());
    }
}
