/// Orchestration of one chat request: augment, stream, write back.
use std::{pin::Pin, sync::Arc};

use {
    futures::StreamExt,
    tokio_stream::Stream,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use recall_memory::{embeddings::EmbeddingProvider, store::MemoryStore};

use crate::{
    augment::ContextAugmenter,
    error::PipelineError,
    model::{CompletionRequest, StreamItem},
    relay::{CompletionRelay, RelayEvent},
};

/// Speaker tag under which finished replies are written back.
const ASSISTANT_SPEAKER: &str = "assistant";

/// One retrieval-augmented streaming completion, wired to concrete clients.
/// Built per request; nothing is shared across invocations except what the
/// clients themselves share.
pub struct ChatPipeline {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn MemoryStore>,
    relay: CompletionRelay,
}

impl ChatPipeline {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn MemoryStore>,
        relay: CompletionRelay,
    ) -> Self {
        Self {
            embeddings,
            store,
            relay,
        }
    }

    /// Run one pipeline invocation.
    ///
    /// Augmentation fully completes (or fails) before the completion request
    /// is issued — the augmented text is part of the outbound payload. The
    /// returned stream then yields caller-visible items as they arrive. When
    /// upstream terminates cleanly the full reply is written back to memory
    /// on a detached task; an aborted or failed stream is never recorded.
    pub async fn run(
        self,
        mut request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamItem> + Send>>, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Aborted);
        }

        let augmenter =
            ContextAugmenter::new(Arc::clone(&self.embeddings), Arc::clone(&self.store));
        request.messages = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Aborted),
            r = augmenter.augment(request.messages) => r?,
        };

        let Self {
            embeddings,
            store,
            relay,
        } = self;

        let stream = async_stream::stream! {
            let mut events = relay.stream(request, cancel);
            while let Some(event) = events.next().await {
                match event {
                    RelayEvent::Metadata { model } => yield StreamItem::Metadata { model },
                    RelayEvent::Text(text) => yield StreamItem::Text(text),
                    RelayEvent::Completed { full_text } => {
                        let embeddings = Arc::clone(&embeddings);
                        let store = Arc::clone(&store);
                        tokio::spawn(async move {
                            if let Err(e) = write_back(&*embeddings, &*store, &full_text).await {
                                warn!(error = %e, "failed to record assistant reply in memory");
                            }
                        });
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Persist the assistant's finished reply. Runs after the caller's channel
/// has closed; failure here is reported, never re-raised.
async fn write_back(
    embeddings: &dyn EmbeddingProvider,
    store: &dyn MemoryStore,
    full_text: &str,
) -> Result<(), PipelineError> {
    let vector = embeddings
        .embed(full_text)
        .await
        .map_err(PipelineError::Embedding)?;
    store
        .upsert(ASSISTANT_SPEAKER, full_text, &vector)
        .await
        .map_err(PipelineError::Store)?;
    debug!(chars = full_text.len(), "assistant reply recorded in memory");
    Ok(())
}
