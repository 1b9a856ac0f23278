//! Streaming client for OpenAI-compatible `/chat/completions` endpoints

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::traits::{LanguageModel, TextStream};
use crate::config::ModelConfig;
use crate::errors::{AppError, AppResult, ModelError};

/// One decoded server-sent event line
#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// Text appended by this chunk
    Delta(String),
    /// Terminal `[DONE]` marker
    Done,
    /// Comments, blank lines, role-only chunks
    Ignored,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a single SSE line from a chat completion stream
pub fn parse_sse_line(line: &str) -> Result<SseEvent, ModelError> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Ignored);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    if data.is_empty() {
        return Ok(SseEvent::Ignored);
    }

    let payload: ChunkPayload =
        serde_json::from_str(data).map_err(|e| ModelError::MalformedStream {
            message: e.to_string(),
        })?;
    match payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
    {
        Some(text) if !text.is_empty() => Ok(SseEvent::Delta(text)),
        _ => Ok(SseEvent::Ignored),
    }
}

/// How long an unreachable endpoint is reported unavailable before the
/// next request is allowed to try it again
pub const UNREACHABLE_BACKOFF: Duration = Duration::from_secs(30);

/// Chat completion model reached over HTTP.
///
/// Availability is tracked from the outcome of real completion requests,
/// so checking it costs no round-trip and works with servers that do not
/// list their models.
pub struct OpenAiCompatibleModel {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    unreachable_until: Mutex<Option<Instant>>,
}

impl OpenAiCompatibleModel {
    /// Build a client from config; the bearer token is read from the
    /// configured environment variable when it is set
    pub fn from_config(config: &ModelConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            unreachable_until: Mutex::new(None),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    fn mark_unreachable(&self) {
        if let Ok(mut until) = self.unreachable_until.lock() {
            *until = Some(Instant::now() + UNREACHABLE_BACKOFF);
        }
    }

    fn mark_reachable(&self) {
        if let Ok(mut until) = self.unreachable_until.lock() {
            *until = None;
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn stream_response(&self, instructions: &str, prompt: &str) -> AppResult<TextStream> {
        let payload = json!({
            "model": self.model,
            "stream": true,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": instructions},
                {"role": "user", "content": prompt}
            ]
        });

        let mut request = self.client.post(self.completions_url()).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!("Model endpoint unreachable: {}", e);
                self.mark_unreachable();
                return Err(ModelError::unavailable(e.to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        self.mark_reachable();
        if !response.status().is_success() {
            return Err(ModelError::GenerationFailed {
                message: format!("model endpoint returned status {}", response.status()),
            }
            .into());
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut buffer = BytesMut::new();
            let mut so_far = String::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(AppError::from)?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line = buffer.split_to(newline + 1);
                    let line = String::from_utf8_lossy(&line[..newline]).into_owned();
                    match parse_sse_line(&line).map_err(AppError::from)? {
                        SseEvent::Delta(text) => {
                            so_far.push_str(&text);
                            yield so_far.clone();
                        }
                        SseEvent::Done => break 'read,
                        SseEvent::Ignored => {}
                    }
                }
            }
            debug!("Model stream finished with {} chars", so_far.chars().count());
        };

        Ok(Box::pin(stream))
    }

    async fn is_available(&self) -> bool {
        match self.unreachable_until.lock() {
            Ok(until) => until.is_none_or(|t| Instant::now() >= t),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta() {
        let line = r#"data: {"id":"x","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseEvent::Delta("Hel".into()));
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]\r").unwrap(), SseEvent::Done);
        assert_eq!(parse_sse_line("").unwrap(), SseEvent::Ignored);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseEvent::Ignored);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), SseEvent::Ignored);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(ModelError::MalformedStream { .. })
        ));
    }

    #[test]
    fn test_endpoint_urls() {
        let config = ModelConfig {
            endpoint: "http://localhost:11434/v1/".to_string(),
            ..ModelConfig::default()
        };
        let model = OpenAiCompatibleModel::from_config(&config).unwrap();
        assert_eq!(
            model.completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    async fn closed_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn test_availability_needs_no_request() {
        let config = ModelConfig {
            endpoint: closed_endpoint().await,
            ..ModelConfig::default()
        };
        let model = OpenAiCompatibleModel::from_config(&config).unwrap();
        assert!(model.is_available().await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_unavailable() {
        let config = ModelConfig {
            endpoint: closed_endpoint().await,
            ..ModelConfig::default()
        };
        let model = OpenAiCompatibleModel::from_config(&config).unwrap();

        let result = model.stream_response("Summarize.", "text").await;
        assert!(matches!(
            result,
            Err(AppError::Model(ModelError::Unavailable { .. }))
        ));
        assert!(!model.is_available().await);

        model.mark_reachable();
        assert!(model.is_available().await);
    }
}
