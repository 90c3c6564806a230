
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::EmbeddingsConfig;
use crate::{RagError, Result};

/// Identity of the embedding space an index was built in.
///
/// A persisted index is only usable when the live client reports the same
/// profile it was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingProfile {
    /// Embedding model name
    pub model: String,
    /// Whether vectors are unit-normalized
    pub normalize: bool,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingsClient {
    base_url: Url,
    model: String,
    normalize: bool,
    batch_size: usize,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingsClient {
    #[inline]
    pub fn new(config: &EmbeddingsConfig, timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build()
            .into();

        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            normalize: config.normalize,
            batch_size: config.batch_size.max(1),
            api_key: config.api_key.clone(),
            agent,
        }
    }

    /// The embedding-space identity this client produces vectors in.
    #[inline]
    pub fn profile(&self) -> EmbeddingProfile {
        EmbeddingProfile {
            model: self.model.clone(),
            normalize: self.normalize,
        }
    }

    /// Embed a single text.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let vectors = self.embed_single_batch(&[text.to_string()])?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("provider returned no embedding".to_string()))
    }

    /// Embed many texts, batching requests to keep payloads bounded.
    ///
    /// Output order matches input order. Each request is attempted once;
    /// a failed batch fails the whole call.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_single_batch(batch)?);
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let url = self.endpoint()?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embeddings request")?;

        let response_text = self.execute(&url, &request_json)?;

        let response: EmbeddingsResponse =
            serde_json::from_str(&response_text).context("Failed to parse embeddings response")?;

        if response.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            )));
        }

        // Providers are free to reorder entries; `index` is authoritative.
        let mut data = response.data;
        data.sort_by_key(|item| item.index);

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let mut embedding = item.embedding;
            if embedding.is_empty() {
                return Err(RagError::Embedding(
                    "provider returned an empty embedding".to_string(),
                ));
            }
            if self.normalize {
                normalize(&mut embedding);
            }
            vectors.push(embedding);
        }

        Ok(vectors)
    }

    fn execute(&self, url: &Url, body: &str) -> Result<String> {
        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");

        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        request
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|error| {
                warn!("Embeddings request to {} failed: {}", url, error);
                request_error(error)
            })
    }

    fn endpoint(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RagError::Config(format!(
                    "Embeddings base URL cannot host paths: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push("embeddings");
        Ok(url)
    }
}

fn request_error(error: ureq::Error) -> RagError {
    match error {
        ureq::Error::StatusCode(status) => {
            if status == 401 || status == 403 || status >= 500 {
                RagError::ProviderUnavailable(format!("Embeddings provider returned HTTP {status}"))
            } else {
                RagError::Embedding(format!("Embeddings request failed: HTTP {status}"))
            }
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => {
            RagError::ProviderUnavailable(format!("Embeddings provider unreachable: {error}"))
        }
        other => RagError::Embedding(format!("Embeddings request failed: {other}")),
    }
}

/// Scale a vector to unit length in place.
///
/// Vectors with near-zero magnitude are left untouched so later similarity
/// math never divides by zero.
#[inline]
pub fn normalize(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq <= 1e-20 {
        return;
    }

    let norm = norm_sq.sqrt();
    for x in v {
        *x /= norm;
    }
}
