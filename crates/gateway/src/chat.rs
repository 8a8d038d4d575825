/// The `/api/chat` route: one retrieval-augmented streaming completion per
/// request.
use std::sync::Arc;

use {
    axum::{
        Json,
        body::Body,
        extract::State,
        http::{StatusCode, header},
        response::{IntoResponse, Response},
    },
    bytes::Bytes,
    futures::StreamExt,
    serde::{Deserialize, Serialize},
    tokio_util::sync::CancellationToken,
    tracing::error,
};

use recall_memory::{embeddings_openai::OpenAiEmbeddingProvider, store_pinecone::PineconeStore};
use recall_pipeline::{
    credentials::resolve_credentials,
    error::PipelineError,
    model::{ChatMessage, CompletionRequest, StreamItem},
    pipeline::ChatPipeline,
    relay::CompletionRelay,
};

use crate::server::AppState;

/// Defaults applied when the caller leaves sampling parameters unset.
const DEFAULT_TEMPERATURE: f32 = 0.5;
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Reported when the caller goes away mid-request (nginx convention).
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Inbound request body. Keys may come per request or from the server
/// environment; see [`crate::config`].
#[derive(Debug, Deserialize)]
pub struct ApiChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default, rename = "dbApiKey")]
    pub db_api_key: Option<String>,
}

/// First segment of the response stream: a JSON object with the few initial
/// variables, ahead of the raw text increments.
#[derive(Debug, Serialize)]
struct FirstPacket {
    model: String,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ApiChatRequest>,
) -> Response {
    let creds = match resolve_credentials(
        &state.config.policy,
        req.api_key.as_deref(),
        req.db_api_key.as_deref(),
    ) {
        Ok(creds) => creds,
        Err(e) => return error_response(e),
    };

    let mut embeddings = OpenAiEmbeddingProvider::new(creds.completion_key.clone());
    if let Some(url) = &state.config.embedding_base_url {
        embeddings = embeddings.with_base_url(url.clone());
    }
    let mut store = PineconeStore::new(creds.store_key);
    if let Some(url) = &state.config.store_base_url {
        store = store.with_base_url(url.clone());
    }
    let mut relay = CompletionRelay::new(creds.completion_key);
    if let Some(url) = &state.config.completion_base_url {
        relay = relay.with_base_url(url.clone());
    }

    let mut request = CompletionRequest::new(req.model, req.messages);
    request.temperature = Some(req.temperature.unwrap_or(DEFAULT_TEMPERATURE));
    request.max_tokens = Some(req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));

    let pipeline = ChatPipeline::new(Arc::new(embeddings), Arc::new(store), relay);
    // Dropping the response body (client disconnect) drops the guard and
    // cancels any pending upstream read.
    let cancel = CancellationToken::new();

    match pipeline.run(request, cancel.clone()).await {
        Ok(stream) => {
            let guard = cancel.drop_guard();
            let body = Body::from_stream(stream.map(move |item| {
                let _keep_alive = &guard;
                Ok::<Bytes, std::convert::Infallible>(encode_item(item))
            }));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                body,
            )
                .into_response()
        },
        Err(e) => error_response(e),
    }
}

fn encode_item(item: StreamItem) -> Bytes {
    match item {
        StreamItem::Metadata { model } => serde_json::to_vec(&FirstPacket { model })
            .map(Bytes::from)
            .unwrap_or_default(),
        StreamItem::Text(text) => Bytes::from(text),
    }
}

fn error_response(err: PipelineError) -> Response {
    let status = match &err {
        PipelineError::MissingCredential(_) => StatusCode::BAD_REQUEST,
        PipelineError::Aborted => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        PipelineError::Embedding(_) | PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(status = status.as_u16(), error = %err, "chat request failed");
    (status, err.to_string()).into_response()
}
