pub mod ollama;
pub mod openai;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use quill_core::domain::generation::{GenerationError, GenerationService};

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

pub fn build_provider(
    settings: &ProviderSettings,
) -> Result<Arc<dyn GenerationService>, GenerationError> {
    match settings.kind {
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(settings)?)),
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::new(settings)?)),
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| GenerationError::ServiceUnavailable(format!("http client: {err}")))
}

fn map_http_error(err: reqwest::Error) -> GenerationError {
    let unavailable = err.is_connect()
        || err.is_timeout()
        || err.status().is_some_and(|status| status.is_server_error());
    if unavailable {
        GenerationError::ServiceUnavailable(err.to_string())
    } else {
        GenerationError::Request(err.to_string())
    }
}

fn trim_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("Ollama".parse::<ProviderKind>(), Ok(ProviderKind::Ollama));
        assert_eq!(" openai ".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn openai_without_key_fails_to_build() {
        let settings = ProviderSettings {
            kind: ProviderKind::OpenAi,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            build_provider(&settings),
            Err(GenerationError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn ollama_builds_with_defaults() {
        let settings = ProviderSettings {
            kind: ProviderKind::Ollama,
            base_url: None,
            model: "llama3.1:8b".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        };
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        assert_eq!(trim_base_url("http://host:1/ "), "http://host:1");
    }
}
