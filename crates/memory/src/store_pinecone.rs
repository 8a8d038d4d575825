/// Pinecone-backed memory store speaking the index's HTTP API.
use async_trait::async_trait;
use {
    chrono::{SecondsFormat, Utc},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use crate::{
    error::MemoryError,
    store::{MemoryMatch, MemoryStore, RecordMetadata},
};

/// All records live in one fixed index; the default URL points at it.
const DEFAULT_BASE_URL: &str = "https://gpt4-general.svc.us-west4-gcp.pinecone.io";

/// Single shared namespace within the index.
const NAMESPACE: &str = "";

pub struct PineconeStore {
    client: reqwest::Client,
    api_key: Secret<String>,
    base_url: String,
}

impl std::fmt::Debug for PineconeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeStore")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PineconeStore {
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, MemoryError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(MemoryError::Upstream { status, body })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<MemoryMatch>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorRecord<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct VectorRecord<'a> {
    id: String,
    values: &'a [f32],
    metadata: RecordMetadata,
}

#[async_trait]
impl MemoryStore for PineconeStore {
    async fn upsert(
        &self,
        speaker: &str,
        message: &str,
        vector: &[f32],
    ) -> Result<(), MemoryError> {
        let req = UpsertRequest {
            vectors: vec![VectorRecord {
                id: Uuid::new_v4().to_string(),
                values: vector,
                metadata: RecordMetadata {
                    speaker: speaker.to_string(),
                    message: message.to_string(),
                    timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                },
            }],
            namespace: NAMESPACE,
        };

        let resp = self
            .client
            .post(format!("{}/vectors/upsert", self.base_url))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&req)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<MemoryMatch>, MemoryError> {
        tracing::debug!(top_k, dims = vector.len(), "querying memory index");
        let req = QueryRequest {
            vector,
            top_k,
            include_values: false,
            include_metadata: true,
            namespace: NAMESPACE,
        };

        let resp = self
            .client
            .post(format!("{}/query", self.base_url))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&req)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json::<QueryResponse>().await?.matches)
    }
}
