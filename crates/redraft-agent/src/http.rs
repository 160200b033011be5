//! OpenAI-compatible chat-completions backend
//!
//! Sends each prompt as a single user message and returns the first choice's
//! content. Transient failures (5xx, 408, dropped connections) are retried with
//! exponential backoff; authentication and quota failures are returned at once.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{GenerationError, Generator, GeneratorConfig, DEFAULT_MODEL};

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Delay before retry number `attempt` (1-based)
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt.saturating_sub(1)))
}

/// Worst-case wall time of one `generate` call: every attempt runs until
/// `per_attempt` expires and every backoff is slept in full.
pub(crate) fn retry_budget(per_attempt: Duration) -> Duration {
    (1..=MAX_RETRIES).fold(
        per_attempt.saturating_mul(MAX_RETRIES + 1),
        |total, attempt| total.saturating_add(backoff(attempt)),
    )
}

/// Chat-completions API client
pub struct HttpGenerator {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::Authentication("no API key configured".into()))?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            http,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        })
    }

    fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    fn map_transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn error_for_status(status: u16, message: String, retry_after: Option<Duration>) -> GenerationError {
    match status {
        401 | 403 => GenerationError::Authentication(message),
        429 => GenerationError::QuotaExceeded { retry_after },
        _ => GenerationError::Api { status, message },
    }
}

/// Pull the text out of a chat-completions response body
fn parse_response(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| GenerationError::MalformedResponse("response contained no message content".into()))
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &str {
        "OpenAI-compatible HTTP"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "generate: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(prompt);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = backoff(attempt);
                warn!(
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    "generate: retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    let err = self.map_transport_error(e);
                    debug!(attempt, error = %err, "generate: request failed");
                    if err.is_retryable() {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);

            let text = response
                .text()
                .await
                .map_err(|e| self.map_transport_error(e))?;

            if !(200..300).contains(&status) {
                let err = error_for_status(status, text, retry_after);
                if err.is_retryable() && attempt < MAX_RETRIES {
                    debug!(attempt, status, "generate: retryable status");
                    last_error = Some(err);
                    continue;
                }
                return Err(err);
            }

            debug!(status, response_len = text.len(), "generate: success");
            return parse_response(&text);
        }

        Err(last_error
            .unwrap_or_else(|| GenerationError::Transport("max retries exceeded".to_string())))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendKind;

    fn config() -> GeneratorConfig {
        GeneratorConfig::new(BackendKind::Http)
            .with_endpoint("http://localhost:9999/")
            .with_api_key("sk-test")
            .with_model("gpt-4o-mini")
    }

    #[test]
    fn test_missing_api_key_is_auth_error() {
        let config = GeneratorConfig::new(BackendKind::Http);
        let result = HttpGenerator::from_config(&config);
        assert!(matches!(result, Err(GenerationError::Authentication(_))));
    }

    #[test]
    fn test_request_body() {
        let generator = HttpGenerator::from_config(&config().with_max_tokens(512)).unwrap();
        let body = generator.build_request_body("rewrite it");

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "rewrite it");
        assert_eq!(generator.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_error_for_status() {
        assert!(matches!(
            error_for_status(401, "bad key".into(), None),
            GenerationError::Authentication(_)
        ));
        assert!(matches!(
            error_for_status(429, String::new(), Some(Duration::from_secs(30))),
            GenerationError::QuotaExceeded {
                retry_after: Some(d)
            } if d == Duration::from_secs(30)
        ));
        assert!(matches!(
            error_for_status(500, "oops".into(), None),
            GenerationError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_budget_covers_every_attempt() {
        let per_attempt = Duration::from_secs(10);
        let schedule: Duration = (1..=MAX_RETRIES).map(backoff).sum();

        let budget = retry_budget(per_attempt);
        assert_eq!(budget, per_attempt * (MAX_RETRIES + 1) + schedule);
        // A first attempt that times out still leaves room for all retries
        assert!(budget - per_attempt >= per_attempt * MAX_RETRIES + schedule);
    }

    #[test]
    fn test_retry_budget_saturates() {
        assert_eq!(retry_budget(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"SCORE: 9"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "SCORE: 9");
    }

    #[test]
    fn test_parse_response_without_content() {
        let empty = r#"{"choices":[]}"#;
        assert!(matches!(
            parse_response(empty),
            Err(GenerationError::MalformedResponse(_))
        ));

        let null_content = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert!(matches!(
            parse_response(null_content),
            Err(GenerationError::MalformedResponse(_))
        ));

        assert!(matches!(
            parse_response("<html>gateway</html>"),
            Err(GenerationError::MalformedResponse(_))
        ));
    }
}
