use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while asking a backend for text
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Quota exceeded (retry after {retry_after:?})")]
    QuotaExceeded { retry_after: Option<Duration> },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to spawn generator process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Generator process failed: {0}")]
    Execution(String),
}

impl GenerationError {
    /// Whether a retry of the same request could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Transport(_) => true,
            GenerationError::Timeout(_) => true,
            GenerationError::Api { status, .. } => *status == 408 || *status >= 500,
            GenerationError::Authentication(_)
            | GenerationError::QuotaExceeded { .. }
            | GenerationError::MalformedResponse(_)
            | GenerationError::Spawn(_)
            | GenerationError::Execution(_) => false,
        }
    }
}

/// Supported generation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible chat-completions endpoint
    #[default]
    Http,
    /// Local agent CLI invoked once per prompt
    Command,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Http => write!(f, "http"),
            BackendKind::Command => write!(f, "command"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" | "openai" => Ok(BackendKind::Http),
            "command" | "cli" => Ok(BackendKind::Command),
            _ => Err(format!("Unknown generator backend: {}", s)),
        }
    }
}

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything a backend needs to talk to its model.
///
/// Built once per run and handed to [`crate::create_generator`]; nothing in
/// this crate reads the process environment on its own.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub backend: BackendKind,
    /// Base URL of the chat-completions service (http backend)
    pub endpoint: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Timeout for a single HTTP request or process run.
    /// The driver's limit for a whole call is [`GeneratorConfig::call_budget`].
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Binary to run (command backend)
    pub command: PathBuf,
    /// Arguments placed before the prompt (command backend)
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: Some(DEFAULT_MODEL.to_string()),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            temperature: 0.0,
            max_tokens: None,
            command: PathBuf::from("claude"),
            args: vec!["--print".to_string()],
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl GeneratorConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_command(mut self, command: PathBuf, args: Vec<String>) -> Self {
        self.command = command;
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, working_dir: PathBuf) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Upper bound a caller should allow for one `generate` call.
    ///
    /// The http backend retries transient failures, so its budget is every
    /// attempt at `timeout` plus the backoff between them; a tighter outer
    /// limit would cut retries off. The command backend makes one attempt.
    pub fn call_budget(&self) -> Duration {
        match self.backend {
            BackendKind::Http => crate::http::retry_budget(self.timeout),
            BackendKind::Command => self.timeout,
        }
    }
}

/// The single call the refinement stages need from a language model
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable name of the backend (e.g., "OpenAI-compatible HTTP")
    fn name(&self) -> &str;

    /// Model identifier, when the backend knows it
    fn model(&self) -> Option<&str> {
        None
    }

    /// Turn a prompt into the model's full text response
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Check whether the backend looks usable before starting a run
    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("http".parse::<BackendKind>().unwrap(), BackendKind::Http);
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::Http);
        assert_eq!("cli".parse::<BackendKind>().unwrap(), BackendKind::Command);
        assert!("carrier-pigeon".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GenerationError::Transport("reset".into()).is_retryable());
        assert!(GenerationError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GenerationError::Api {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!GenerationError::Api {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!GenerationError::Authentication("nope".into()).is_retryable());
        assert!(!GenerationError::QuotaExceeded { retry_after: None }.is_retryable());
    }

    #[test]
    fn test_config_builders() {
        let config = GeneratorConfig::new(BackendKind::Command)
            .with_model("sonnet")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.backend, BackendKind::Command);
        assert_eq!(config.model.as_deref(), Some("sonnet"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_call_budget_leaves_room_for_http_retries() {
        let timeout = Duration::from_secs(10);

        let http = GeneratorConfig::new(BackendKind::Http).with_timeout(timeout);
        // Four attempts of 10s plus 1s + 2s + 4s of backoff
        assert_eq!(http.call_budget(), Duration::from_secs(47));

        let command = GeneratorConfig::new(BackendKind::Command).with_timeout(timeout);
        assert_eq!(command.call_budget(), timeout);
    }
}
