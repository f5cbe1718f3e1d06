use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use quill_core::domain::generation::{GenerationError, GenerationService};
use quill_core::text::preview;

use super::{http_client, map_http_error, trim_base_url, ProviderSettings};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, GenerationError> {
        Ok(Self {
            http: http_client(settings.timeout)?,
            base_url: trim_base_url(settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationService for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(model = %self.model, prompt = %preview(prompt, 100), "sending prompt to ollama");
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(map_http_error)?;
        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        let text = payload.response.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::InvalidResponse("empty response".to_string()));
        }
        debug!(response = %preview(&text, 100), "received ollama response");
        Ok(text)
    }

    async fn close(&self) {
        debug!(model = %self.model, "ollama provider closed");
    }
}
