use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use quill_core::domain::generation::{GenerationError, GenerationService};
use quill_core::text::preview;

use super::{http_client, map_http_error, trim_base_url, ProviderSettings};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Any server speaking the OpenAI chat completions protocol.
pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, GenerationError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GenerationError::ServiceUnavailable("missing api key".to_string()))?
            .to_string();
        Ok(Self {
            http: http_client(settings.timeout)?,
            base_url: trim_base_url(settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
            model: settings.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl GenerationService for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(model = %self.model, prompt = %preview(prompt, 100), "sending prompt to chat completions");
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(map_http_error)?;
        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GenerationError::InvalidResponse("empty completion".to_string()))?;
        debug!(response = %preview(&text, 100), "received chat completion");
        Ok(text)
    }
}
