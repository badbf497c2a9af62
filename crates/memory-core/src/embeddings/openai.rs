//! ============================================================================
//! Embedding Service - OpenAI-compatible embeddings over HTTP
//! ============================================================================
//! Works against OpenAI, x.ai, Ollama's `/v1` shim, or any server exposing
//! `POST {base_url}/embeddings`.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;

/// Embedding service for generating text vectors
pub struct EmbeddingService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: Option<String>,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Turn a non-2xx reply into an error, preferring the structured message
fn rejection(status: StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => match error.kind {
            Some(kind) => anyhow!(
                "Embedding endpoint rejected request ({}, {}): {}",
                status,
                kind,
                error.message
            ),
            None => anyhow!(
                "Embedding endpoint rejected request ({}): {}",
                status,
                error.message
            ),
        },
        Err(_) => anyhow!("Embedding endpoint rejected request ({}): {}", status, body),
    }
}

impl EmbeddingService {
    /// Create a service for `model` at `base_url` (no trailing slash)
    pub fn new(api_key: Option<String>, base_url: String, model: String, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimension,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the batch and return the raw reply
    async fn post(&self, input: Vec<String>) -> Result<(StatusCode, String)> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input,
        };

        let mut call = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let reply = call
            .send()
            .await
            .map_err(|e| anyhow!("Embedding endpoint {} unreachable: {}", self.base_url, e))?;
        let status = reply.status();
        let body = reply
            .text()
            .await
            .map_err(|e| anyhow!("Embedding reply could not be read: {}", e))?;
        Ok((status, body))
    }

    /// Vectors for `texts`, in input order
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let count = texts.len();
        let (status, body) = self.post(texts).await?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        let reply: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Malformed embedding reply: {} (body: {})", e, body))?;
        debug!(
            "{} embedded {} texts ({} tokens)",
            reply.model.as_deref().unwrap_or(&self.model),
            count,
            reply.usage.map(|u| u.total_tokens).unwrap_or_default()
        );

        // The endpoint may answer out of order
        let mut data = reply.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(vec![text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer, key: Option<&str>) -> EmbeddingService {
        EmbeddingService::new(
            key.map(String::from),
            format!("{}/v1/", server.uri()),
            "text-embedding-3-small".to_string(),
            3,
        )
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let service = EmbeddingService::new(None, "http://host/v1/".into(), "m".into(), 3);
        assert_eq!(service.base_url(), "http://host/v1");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let service = EmbeddingService::new(None, "http://localhost:9".into(), "m".into(), 3);
        let result = service.embed_batch(vec![]).await;
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_sorts_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.0, 1.0, 0.0], "index": 1},
                    {"embedding": [1.0, 0.0, 0.0], "index": 0}
                ],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })))
            .mount(&server)
            .await;

        let vectors = service(&server, Some("sk-test"))
            .embed_batch(vec!["a".into(), "b".into()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_api_error_message_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "invalid api key", "type": "auth"}
            })))
            .mount(&server)
            .await;

        let err = service(&server, None).embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("invalid api key"));
        assert!(err.to_string().contains("auth"));
    }

    #[tokio::test]
    async fn test_unstructured_error_body_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = service(&server, None).embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_no_data_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = service(&server, None).embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("No embedding returned"));
    }
}
