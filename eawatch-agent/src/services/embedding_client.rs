//! Embedding service client
//!
//! Calls an OpenAI-compatible embeddings endpoint to turn incident summaries
//! into fixed-dimension vectors. Failures here never block incident
//! persistence; the similarity index records a stage error and the incident
//! still lands in the document and graph stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use eawatch_common::{Error, Result};

use crate::config::EmbeddingConfig;
use crate::util::{classify_reqwest, retry, RetryPolicy};

const USER_AGENT: &str = concat!("eawatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// An embedding plus the number of upstream calls it cost.
#[derive(Debug)]
pub struct EmbedResult {
    pub vector: Vec<f32>,
    pub api_calls: usize,
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    retry: RetryPolicy,
    expected_dim: usize,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig, expected_dim: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;
        let retry = RetryPolicy::new(config.max_retries);

        Ok(Self {
            http,
            config,
            retry,
            expected_dim,
        })
    }

    /// Embed one text. Transient upstream failures are retried up to the
    /// configured bound; anything else surfaces as an embedding failure.
    pub async fn embed(&self, text: &str) -> Result<EmbedResult> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Embedding("no API key configured".to_string()))?;

        let url = format!("{}/embeddings", self.config.base_url);
        let calls = AtomicUsize::new(0);

        let response: EmbeddingsResponse = retry(&self.retry, "embedding", || {
            calls.fetch_add(1, Ordering::Relaxed);
            let request = self
                .http
                .post(&url)
                .bearer_auth(api_key)
                .json(&json!({
                    "model": self.config.model,
                    "input": [text],
                }));
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| classify_reqwest(e, "embedding"))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::from_status(status.as_u16(), "embedding"));
                }
                response.json().await.map_err(|e| Error::TerminalUpstream {
                    status: None,
                    message: format!("embedding: malformed payload: {e}"),
                })
            }
        })
        .await
        .map_err(|e| match e {
            Error::Embedding(_) => e,
            other => Error::Embedding(other.to_string()),
        })?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("empty embeddings response".to_string()))?;

        if vector.len() != self.expected_dim {
            return Err(Error::Embedding(format!(
                "dimension mismatch: expected {}, got {}",
                self.expected_dim,
                vector.len()
            )));
        }

        Ok(EmbedResult {
            vector,
            api_calls: calls.into_inner(),
        })
    }
}
