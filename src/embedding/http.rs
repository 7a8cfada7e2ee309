//! HTTP embedding providers (OpenAI-compatible and Ollama).
//!
//! Both share [`post_with_retry`]:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (other) → fail immediately
//! - Network errors → retry
//!
//! Backoff doubles from one second and is capped at 32 seconds.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::{check_batch, EmbeddingProvider, Embeddings};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Embedding provider using the OpenAI API (or any compatible gateway).
///
/// Calls `POST {url}/embeddings`. Requires the `OPENAI_API_KEY`
/// environment variable. Inputs larger than `batch_size` are split into
/// several requests; a failure in any of them fails the whole batch.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `model` or `dims` is not set, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::config("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::config("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let request = self
                .client
                .post(format!("{}/embeddings", self.url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body);
            let json = post_with_retry("OpenAI", request, self.max_retries).await?;
            let part = parse_openai_response(&json)?;
            check_batch(batch.len(), &part)?;
            check_dims(self.dims, &part)?;
            vectors.extend(part);
        }
        check_batch(texts.len(), &vectors)?;
        Ok(Embeddings {
            vectors,
            model: self.model.clone(),
        })
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::provider("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::provider("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, to_f32_vec(embedding)?));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::config("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body);
        let json = post_with_retry("Ollama", request, self.max_retries)
            .await
            .map_err(|e| match e {
                Error::Provider(msg) => Error::Provider(format!(
                    "{} (is Ollama running at {}?)",
                    msg, self.url
                )),
                other => other,
            })?;
        let vectors = parse_ollama_response(&json)?;
        check_batch(texts.len(), &vectors)?;
        check_dims(self.dims, &vectors)?;
        Ok(Embeddings {
            vectors,
            model: self.model.clone(),
        })
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::provider("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding.as_array().ok_or_else(|| {
                Error::provider("Invalid Ollama response: embedding is not an array")
            })?;
            to_f32_vec(values)
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::provider(format!("non-numeric embedding value: {}", v)))
        })
        .collect()
}

/// Every vector must have the configured dimensionality.
fn check_dims(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(v) => Err(Error::provider(format!(
            "embedding has {} dims, expected {}",
            v.len(),
            expected
        ))),
        None => Ok(()),
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::provider(format!("failed to build HTTP client: {}", e)))
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Send `request`, retrying transient failures up to `max_retries` times.
async fn post_with_retry(
    service: &str,
    request: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(service, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let attempt_request = request
            .try_clone()
            .ok_or_else(|| Error::provider("embedding request body is not cloneable"))?;

        match attempt_request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        Error::provider(format!("{} returned invalid JSON: {}", service, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::provider(format!("{} API error {}: {}", service, status, body_text));

                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, attempt, "transient embedding failure");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                warn!(service, attempt, error = %e, "embedding request failed");
                last_err = Some(Error::provider(format!("{} connection error: {}", service, e)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        Error::provider(format!("{} embedding failed after retries", service))
    }))
}
