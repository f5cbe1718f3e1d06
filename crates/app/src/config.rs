use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use quill_core::domain::filter::{DEFAULT_TERMS, DEFAULT_THRESHOLD};
use quill_infra::llm::{ProviderKind, ProviderSettings};
use quill_infra::reddit::RedditCredentials;

pub const DEFAULT_PERSONA: &str = "You are a friendly, curious regular of this community. \
You write short, warm, conversational comments in plain language, \
never mention that you are a bot, and never lecture people.";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub database_url: String,
    pub reddit: RedditCredentials,
    pub subreddit: String,
    pub llm: ProviderSettings,
    pub persona_file: Option<PathBuf>,
    pub scan_interval: Duration,
    pub reply_scan_interval: Duration,
    pub max_conversation_depth: u32,
    pub fetch_limit: usize,
    pub own_comments_limit: usize,
    pub cache_size: usize,
    pub min_post_interval: Duration,
    pub reply_delay: ReplyDelay,
    pub filter_threshold: f64,
    pub filter_terms: Vec<String>,
    pub loop_backoff: Duration,
    pub rate_limit_backoff: Duration,
}

/// Bounds of the randomized pause before a reply is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDelay {
    pub min: Duration,
    pub max: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid socket address: {0}")]
    InvalidSocket(String),
    #[error("invalid integer for {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("missing required configuration: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),
    #[error("unreadable persona template {path}: {source}")]
    Persona {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("dotenv error: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let mut missing = Vec::new();
        let mut required = |key: &'static str| match env.optional(key) {
            Some(value) => value,
            None => {
                missing.push(key);
                String::new()
            }
        };
        let reddit = RedditCredentials {
            client_id: required("CLIENT_ID"),
            client_secret: required("CLIENT_SECRET"),
            username: required("USERNAME"),
            password: required("PASSWORD"),
            user_agent: required("USER_AGENT"),
        };
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing));
        }

        let http_addr_raw = env.string("HTTP_ADDR", "127.0.0.1:8080");
        let http_addr = http_addr_raw
            .parse()
            .map_err(|_| ConfigError::InvalidSocket(http_addr_raw.clone()))?;
        let subreddit = env.string("SUBREDDIT", "test");
        if subreddit.trim().is_empty() {
            return Err(ConfigError::InvalidValue("SUBREDDIT", subreddit));
        }

        let provider_raw = env.string("LLM_PROVIDER", "ollama");
        let kind: ProviderKind = provider_raw
            .parse()
            .map_err(|value| ConfigError::InvalidValue("LLM_PROVIDER", value))?;
        let llm = ProviderSettings {
            kind,
            base_url: env.optional("LLM_BASE_URL"),
            model: env.string("LLM_MODEL", "llama3.1:8b"),
            api_key: env.optional("LLM_API_KEY"),
            timeout: Duration::from_secs(env.u64("LLM_TIMEOUT", 30)?),
        };

        let cache_size = env.usize("POST_CACHE_SIZE", 1000)?;
        if cache_size == 0 {
            return Err(ConfigError::InvalidValue(
                "POST_CACHE_SIZE",
                cache_size.to_string(),
            ));
        }
        let max_conversation_depth = env.u32("MAX_CONVERSATIONS", 5)?;
        let reply_delay = ReplyDelay {
            min: Duration::from_secs(env.u64("REPLY_DELAY_MIN", 30)?),
            max: Duration::from_secs(env.u64("REPLY_DELAY_MAX", 120)?),
        };
        if reply_delay.min > reply_delay.max {
            return Err(ConfigError::InvalidValue(
                "REPLY_DELAY_MIN",
                format!(
                    "{}s exceeds REPLY_DELAY_MAX {}s",
                    reply_delay.min.as_secs(),
                    reply_delay.max.as_secs()
                ),
            ));
        }
        let filter_threshold = env.f64("FILTER_THRESHOLD", DEFAULT_THRESHOLD)?;
        if !(0.0..=1.0).contains(&filter_threshold) {
            return Err(ConfigError::InvalidValue(
                "FILTER_THRESHOLD",
                filter_threshold.to_string(),
            ));
        }
        let filter_terms = match env.optional("FILTER_TERMS") {
            Some(raw) => raw
                .split(',')
                .map(|term| term.trim().to_string())
                .filter(|term| !term.is_empty())
                .collect(),
            None => DEFAULT_TERMS.iter().map(|term| term.to_string()).collect(),
        };

        Ok(Self {
            http_addr,
            database_url: env.string("DATABASE_URL", "sqlite://data/reddit_bot.db"),
            reddit,
            subreddit,
            llm,
            persona_file: env.optional("PERSONA_FILE").map(PathBuf::from),
            scan_interval: Duration::from_secs(env.u64("SCAN_INTERVAL", 60)?),
            reply_scan_interval: Duration::from_secs(env.u64("REPLY_SCAN_INTERVAL", 300)?),
            max_conversation_depth,
            fetch_limit: env.usize("POSTS_FETCH_LIMIT", 5)?,
            own_comments_limit: env.usize("OWN_COMMENTS_LIMIT", 25)?,
            cache_size,
            min_post_interval: Duration::from_secs(env.u64("MIN_POST_INTERVAL", 25)?),
            reply_delay,
            filter_threshold,
            filter_terms,
            loop_backoff: Duration::from_secs(env.u64("LOOP_BACKOFF", 5)?),
            rate_limit_backoff: Duration::from_secs(env.u64("RATE_LIMIT_BACKOFF", 60)?),
        })
    }

    /// Persona template: `override_path`, then PERSONA_FILE, then the
    /// built-in default.
    pub fn load_persona(&self, override_path: Option<&Path>) -> Result<String, ConfigError> {
        let Some(path) = override_path.or(self.persona_file.as_deref()) else {
            return Ok(DEFAULT_PERSONA.to_string());
        };
        let persona = std::fs::read_to_string(path).map_err(|source| ConfigError::Persona {
            path: path.to_path_buf(),
            source,
        })?;
        if persona.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "PERSONA_FILE",
                format!("{} is empty", path.display()),
            ));
        }
        Ok(persona)
    }
}

/// Loads `.env` when present. Variables already set are left alone.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(key, raw)),
            None => Ok(default),
        }
    }

    fn u64(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        self.parsed(key, default)
    }

    fn u32(&self, key: &'static str, default: u32) -> Result<u32, ConfigError> {
        self.parsed(key, default)
    }

    fn usize(&self, key: &'static str, default: usize) -> Result<usize, ConfigError> {
        self.parsed(key, default)
    }

    fn f64(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        self.parsed(key, default)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{AppConfig, ConfigError, DEFAULT_PERSONA};
    use quill_infra::llm::ProviderKind;

    fn credentials() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CLIENT_ID", "id"),
            ("CLIENT_SECRET", "secret"),
            ("USERNAME", "quill_bot"),
            ("PASSWORD", "hunter2"),
            ("USER_AGENT", "quill/0.1"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn defaults_match_original_bot() {
        let config = load(&credentials()).unwrap();
        assert_eq!(config.subreddit, "test");
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert_eq!(config.reply_scan_interval, Duration::from_secs(300));
        assert_eq!(config.max_conversation_depth, 5);
        assert_eq!(config.fetch_limit, 5);
        assert_eq!(config.cache_size, 1000);
        assert_eq!(config.min_post_interval, Duration::from_secs(25));
        assert_eq!(config.filter_threshold, 0.4);
        assert_eq!(config.llm.kind, ProviderKind::Ollama);
    }

    #[test]
    fn missing_credentials_are_listed() {
        let mut vars = credentials();
        vars.remove("PASSWORD");
        vars.insert("CLIENT_ID", "   ");
        match load(&vars) {
            Err(ConfigError::MissingRequired(missing)) => {
                assert_eq!(missing, vec!["CLIENT_ID", "PASSWORD"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut vars = credentials();
        vars.insert("SCAN_INTERVAL", "soon");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidNumber("SCAN_INTERVAL", _))
        ));
    }

    #[test]
    fn reply_delay_range_must_be_ordered() {
        let mut vars = credentials();
        vars.insert("REPLY_DELAY_MIN", "90");
        vars.insert("REPLY_DELAY_MAX", "10");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidValue("REPLY_DELAY_MIN", _))
        ));
    }

    #[test]
    fn threshold_and_provider_are_validated() {
        let mut vars = credentials();
        vars.insert("FILTER_THRESHOLD", "1.5");
        assert!(load(&vars).is_err());
        let mut vars = credentials();
        vars.insert("LLM_PROVIDER", "mystery");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidValue("LLM_PROVIDER", _))
        ));
    }

    #[test]
    fn filter_terms_are_split_on_commas() {
        let mut vars = credentials();
        vars.insert("FILTER_TERMS", "crypto, nft ,,");
        let config = load(&vars).unwrap();
        assert_eq!(config.filter_terms, vec!["crypto", "nft"]);
    }

    #[test]
    fn persona_falls_back_to_default_and_fails_on_missing_file() {
        let config = load(&credentials()).unwrap();
        assert_eq!(config.load_persona(None).unwrap(), DEFAULT_PERSONA);
        let missing = std::path::Path::new("/nonexistent/quill/persona.txt");
        assert!(matches!(
            config.load_persona(Some(missing)),
            Err(ConfigError::Persona { .. })
        ));
    }
}
