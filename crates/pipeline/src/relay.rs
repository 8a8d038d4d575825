/// Streaming relay to the completion provider.
///
/// Opens the chat-completions request with `stream=true, n=1`, decodes the
/// SSE response incrementally, and re-emits it as [`RelayEvent`]s. Protocol
/// failures discovered after the connection opened are surfaced as readable
/// text on the same channel: the transport to the caller is a single byte
/// stream with no separate error lane.
use std::pin::Pin;

use {
    futures::StreamExt,
    secrecy::{ExposeSecret, Secret},
    tokio_stream::Stream,
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

use crate::{
    model::{CompletionChunk, CompletionRequest},
    sse::SseDecoder,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Literal notice emitted when the caller cancels before any output.
pub const ABORT_NOTICE: &str = "Request aborted by the user.";

/// Events produced while relaying one completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Announces the concrete model variant serving the request. Emitted at
    /// most once, always before any `Text`.
    Metadata { model: String },
    /// One verbatim text increment, in upstream arrival order.
    Text(String),
    /// The upstream stream terminated cleanly; `full_text` is the
    /// concatenation of every `Text` emitted before it.
    Completed { full_text: String },
}

pub struct CompletionRelay {
    client: reqwest::Client,
    api_key: Secret<String>,
    base_url: String,
}

impl std::fmt::Debug for CompletionRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRelay")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CompletionRelay {
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

    /// Relay one completion request, yielding events as upstream produces
    /// them. `cancel` is observed at every suspension point; a cancelled
    /// stream never yields `Completed`.
    pub fn stream(
        &self,
        mut request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Stream<Item = RelayEvent> + Send + '_>> {
        Box::pin(async_stream::stream! {
            request.stream = true;
            request.n = 1;

            let send = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(self.api_key.expose_secret())
                .json(&request)
                .send();

            let resp = tokio::select! {
                _ = cancel.cancelled() => {
                    yield RelayEvent::Text(ABORT_NOTICE.to_string());
                    return;
                }
                r = send => match r {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "completion request failed");
                        return;
                    }
                },
            };

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                yield RelayEvent::Text(format!("OpenAI API error: {status} {body}"));
                return;
            }

            let mut body_stream = resp.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut sent_metadata = false;
            let mut sent_any = false;
            let mut full_reply = String::new();

            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        if !sent_any {
                            yield RelayEvent::Text(ABORT_NOTICE.to_string());
                        }
                        return;
                    }
                    c = body_stream.next() => c,
                };
                let chunk = match chunk {
                    Some(Ok(c)) => c,
                    Some(Err(e)) => {
                        warn!(error = %e, "completion stream transport error");
                        return;
                    }
                    None => {
                        // Upstream closed without a terminator event.
                        warn!("completion stream ended without [DONE]");
                        return;
                    }
                };

                for event in decoder.push(&chunk) {
                    if event.data == "[DONE]" {
                        yield RelayEvent::Completed {
                            full_text: std::mem::take(&mut full_reply),
                        };
                        return;
                    }

                    let parsed: CompletionChunk = match serde_json::from_str(&event.data) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "malformed completion chunk");
                            return;
                        }
                    };

                    let Some(choice) = parsed.choices.first() else {
                        continue;
                    };
                    // A role-only delta announces the speaker and carries no text.
                    if choice.delta.role.is_some() && choice.delta.content.is_none() {
                        continue;
                    }

                    if !sent_metadata {
                        sent_metadata = true;
                        sent_any = true;
                        yield RelayEvent::Metadata {
                            model: parsed.model.clone(),
                        };
                    }

                    if let Some(text) = choice.delta.content.as_deref() {
                        if !text.is_empty() {
                            full_reply.push_str(text);
                            sent_any = true;
                            yield RelayEvent::Text(text.to_string());
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::{ChatMessage, Role};

    fn relay(url: String) -> CompletionRelay {
        CompletionRelay::new(Secret::new("sk-test".into())).with_base_url(url)
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "gpt-4".into(),
            vec![ChatMessage {
                role: Role::User,
                content: "hi".into(),
            }],
        )
    }

    async fn collect(
        relay: &CompletionRelay,
        cancel: CancellationToken,
    ) -> Vec<RelayEvent> {
        relay.stream(request(), cancel).collect().await
    }

    const STREAM_BODY: &str = concat!(
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,",
        "\"model\":\"gpt-4-0314\",\"choices\":[{\"delta\":{\"role\":\"assistant\"},",
        "\"index\":0,\"finish_reason\":null}]}\n\n",
        "data: {\"model\":\"gpt-4-0314\",\"choices\":[{\"delta\":{\"content\":\"Hel\"},",
        "\"index\":0,\"finish_reason\":null}]}\n\n",
        "data: {\"model\":\"gpt-4-0314\",\"choices\":[{\"delta\":{\"content\":\"lo\"},",
        "\"index\":0,\"finish_reason\":null}]}\n\n",
        "data: {\"model\":\"gpt-4-0314\",\"choices\":[{\"delta\":{},\"index\":0,",
        "\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[tokio::test]
    async fn relays_metadata_then_text_then_completion() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(STREAM_BODY)
            .create_async()
            .await;

        let events = collect(&relay(server.url()), CancellationToken::new()).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Metadata {
                    model: "gpt-4-0314".into()
                },
                RelayEvent::Text("Hel".into()),
                RelayEvent::Text("lo".into()),
                RelayEvent::Completed {
                    full_text: "Hello".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn forces_streaming_single_candidate_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "stream": true,
                "n": 1,
            })))
            .with_status(200)
            .with_body("data: [DONE]\n\n")
            .create_async()
            .await;

        let mut req = request();
        req.stream = false;
        req.n = 3;
        let _ = relay(server.url())
            .stream(req, CancellationToken::new())
            .collect::<Vec<_>>()
            .await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upstream_error_becomes_single_in_band_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create_async()
            .await;

        let events = collect(&relay(server.url()), CancellationToken::new()).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            RelayEvent::Text(text) => {
                assert!(text.contains("429"));
                assert!(text.contains("rate limited"));
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_reply_still_completes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(concat!(
                "data: {\"model\":\"gpt-4-0314\",\"choices\":[{\"delta\":{},",
                "\"index\":0,\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
            ))
            .create_async()
            .await;

        let events = collect(&relay(server.url()), CancellationToken::new()).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Metadata {
                    model: "gpt-4-0314".into()
                },
                RelayEvent::Completed {
                    full_text: String::new()
                },
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_before_output_yields_single_notice() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(STREAM_BODY)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = collect(&relay(server.url()), cancel).await;
        assert_eq!(events, vec![RelayEvent::Text(ABORT_NOTICE.to_string())]);
    }

    #[tokio::test]
    async fn truncated_stream_never_completes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(concat!(
                "data: {\"model\":\"gpt-4-0314\",\"choices\":[{\"delta\":{\"content\":\"partial\"},",
                "\"index\":0,\"finish_reason\":null}]}\n\n",
            ))
            .create_async()
            .await;

        let events = collect(&relay(server.url()), CancellationToken::new()).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Metadata {
                    model: "gpt-4-0314".into()
                },
                RelayEvent::Text("partial".into()),
            ]
        );
    }
}
