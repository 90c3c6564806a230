
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::GenerationConfig;
use crate::{RagError, Result};

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    base_url: Url,
    model: String,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl GenerationClient {
    #[inline]
    pub fn new(config: &GenerationConfig, timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build()
            .into();

        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            agent,
        }
    }

    /// Run a single chat completion for `prompt`.
    ///
    /// The prompt is sent as one user message and the request is attempted
    /// exactly once; provider failures surface to the caller.
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from model {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let url = self.endpoint()?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send(request_json.as_str())
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|error| {
                warn!("Chat request to {} failed: {}", url, error);
                request_error(error)
            })?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagError::Generation("provider returned no choices".to_string()))?;

        debug!("Received completion ({} chars)", answer.chars().count());
        Ok(answer)
    }

    fn endpoint(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RagError::Config(format!(
                    "Generation base URL cannot host paths: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["chat", "completions"]);
        Ok(url)
    }
}

fn request_error(error: ureq::Error) -> RagError {
    match error {
        ureq::Error::StatusCode(status) => {
            if status == 401 || status == 403 || status >= 500 {
                RagError::ProviderUnavailable(format!("Generation provider returned HTTP {status}"))
            } else {
                RagError::Generation(format!("Chat request failed: HTTP {status}"))
            }
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => {
            RagError::ProviderUnavailable(format!("Generation provider unreachable: {error}"))
        }
        other => RagError::Generation(format!("Chat request failed: {other}")),
    }
}
