//! Project configuration file support for redraft.
//!
//! Loads configuration from `redraft.toml` in the working directory and merges
//! it with command-line overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use redraft_agent::{BackendKind, GeneratorConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use redraft_core::{
    default_preserved_fields, RoutePolicy, DEFAULT_FENCE_LANGUAGE, DEFAULT_MAX_ROUNDS,
    DEFAULT_SCORE_THRESHOLD,
};
use redraft_critic::{PromptTemplates, DEFAULT_CHAR_BUDGET};

/// The config file name
pub const CONFIG_FILE_NAME: &str = "redraft.toml";

/// Env var holding the API key unless `api_key_env` says otherwise
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Project-level configuration loaded from `redraft.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default, rename = "loop")]
    pub loop_settings: LoopSection,
    #[serde(default)]
    pub prompts: PromptSection,
    /// Invariant fields the reviser must not alter
    pub preserve: Option<Vec<String>>,
}

/// `[generator]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneratorSection {
    pub backend: Option<BackendKind>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    /// Name of the env var holding the API key
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Binary for the command backend
    pub command: Option<PathBuf>,
    pub args: Option<Vec<String>>,
}

/// `[loop]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoopSection {
    pub max_rounds: Option<usize>,
    pub score_threshold: Option<u8>,
    pub scorer_char_budget: Option<usize>,
    pub fence_language: Option<String>,
}

/// `[prompts]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PromptSection {
    pub reviser: Option<String>,
    pub scorer: Option<String>,
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub backend: Option<BackendKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_rounds: Option<usize>,
    pub threshold: Option<u8>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub backend: BackendKind,
    pub endpoint: String,
    pub model: Option<String>,
    pub api_key_env: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub policy: RoutePolicy,
    pub scorer_char_budget: usize,
    pub fence_language: String,
    pub prompts: PromptTemplates,
    pub preserve: Vec<String>,
}

impl RunSettings {
    /// Merge settings. Priority: CLI > `redraft.toml` > built-in defaults.
    pub fn resolve(config: Option<ProjectConfig>, cli: &CliOverrides) -> Self {
        let config = config.unwrap_or_default();
        let generator = config.generator;
        let loop_settings = config.loop_settings;
        let defaults = GeneratorConfig::default();

        let backend = cli.backend.or(generator.backend).unwrap_or_default();

        // An agent CLI picks its own model unless one is named explicitly
        let model = cli.model.clone().or(generator.model).or(match backend {
            BackendKind::Http => Some(DEFAULT_MODEL.to_string()),
            BackendKind::Command => None,
        });

        let timeout = cli
            .timeout_secs
            .or(generator.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let policy = RoutePolicy::new(
            cli.max_rounds
                .or(loop_settings.max_rounds)
                .unwrap_or(DEFAULT_MAX_ROUNDS),
            cli.threshold
                .or(loop_settings.score_threshold)
                .unwrap_or(DEFAULT_SCORE_THRESHOLD),
        );

        let mut prompts = PromptTemplates::default();
        if let Some(reviser) = config.prompts.reviser {
            prompts = prompts.with_reviser(reviser);
        }
        if let Some(scorer) = config.prompts.scorer {
            prompts = prompts.with_scorer(scorer);
        }

        Self {
            backend,
            endpoint: cli
                .endpoint
                .clone()
                .or(generator.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model,
            api_key_env: generator
                .api_key_env
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            timeout,
            temperature: generator.temperature.unwrap_or(defaults.temperature),
            max_tokens: generator.max_tokens,
            command: generator.command.unwrap_or(defaults.command),
            args: generator.args.unwrap_or(defaults.args),
            policy,
            scorer_char_budget: loop_settings
                .scorer_char_budget
                .unwrap_or(DEFAULT_CHAR_BUDGET),
            fence_language: loop_settings
                .fence_language
                .unwrap_or_else(|| DEFAULT_FENCE_LANGUAGE.to_string()),
            prompts,
            preserve: config.preserve.unwrap_or_else(default_preserved_fields),
        }
    }

    /// Build the generator configuration handed to the backend factory
    pub fn generator_config(&self, api_key: Option<String>, working_dir: &Path) -> GeneratorConfig {
        let mut config = GeneratorConfig::new(self.backend)
            .with_endpoint(self.endpoint.clone())
            .with_timeout(self.timeout)
            .with_temperature(self.temperature)
            .with_command(self.command.clone(), self.args.clone())
            .with_working_dir(working_dir.to_path_buf());
        config.model = self.model.clone();
        config.api_key = api_key;
        config.max_tokens = self.max_tokens;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_config() {
        let dir = TempDir::new().unwrap();
        let result = ProjectConfig::load(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
preserve = ["the title"]

[generator]
backend = "http"
endpoint = "http://localhost:8080"
model = "local-model"
api_key_env = "LOCAL_KEY"
timeout_secs = 30
temperature = 0.2
max_tokens = 2048

[loop]
max_rounds = 5
score_threshold = 9
scorer_char_budget = 1000
fence_language = "markdown"

[prompts]
scorer = "Grade {document} against {spec}"
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.generator.backend, Some(BackendKind::Http));
        assert_eq!(config.generator.api_key_env.as_deref(), Some("LOCAL_KEY"));
        assert_eq!(config.loop_settings.max_rounds, Some(5));
        assert_eq!(config.preserve, Some(vec!["the title".to_string()]));

        let settings = RunSettings::resolve(Some(config), &CliOverrides::default());
        assert_eq!(settings.endpoint, "http://localhost:8080");
        assert_eq!(settings.model.as_deref(), Some("local-model"));
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.max_tokens, Some(2048));
        assert_eq!(settings.policy, RoutePolicy::new(5, 9));
        assert_eq!(settings.scorer_char_budget, 1000);
        assert_eq!(settings.fence_language, "markdown");
        assert_eq!(settings.prompts.scorer, "Grade {document} against {spec}");
        assert_eq!(settings.preserve, vec!["the title".to_string()]);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[loop]\nmax_round = 4\n",
        )
        .unwrap();

        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_defaults_without_config() {
        let settings = RunSettings::resolve(None, &CliOverrides::default());

        assert_eq!(settings.backend, BackendKind::Http);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(settings.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert_eq!(settings.policy, RoutePolicy::default());
        assert_eq!(settings.scorer_char_budget, DEFAULT_CHAR_BUDGET);
        assert_eq!(settings.fence_language, "latex");
        assert_eq!(settings.preserve, default_preserved_fields());
    }

    #[test]
    fn test_cli_overrides_config() {
        let config: ProjectConfig = toml::from_str(
            r#"
[generator]
model = "from-file"
timeout_secs = 30

[loop]
max_rounds = 5
score_threshold = 9
"#,
        )
        .unwrap();
        let cli = CliOverrides {
            model: Some("from-cli".into()),
            max_rounds: Some(2),
            ..Default::default()
        };

        let settings = RunSettings::resolve(Some(config), &cli);
        assert_eq!(settings.model.as_deref(), Some("from-cli"));
        assert_eq!(settings.policy.max_rounds, 2);
        // Not given on the command line, so the file wins
        assert_eq!(settings.policy.score_threshold, 9);
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_command_backend_leaves_model_unset() {
        let cli = CliOverrides {
            backend: Some(BackendKind::Command),
            ..Default::default()
        };

        let settings = RunSettings::resolve(None, &cli);
        assert_eq!(settings.model, None);
        assert_eq!(settings.command, PathBuf::from("claude"));
        assert_eq!(settings.args, vec!["--print".to_string()]);
    }

    #[test]
    fn test_generator_config_carries_settings() {
        let settings = RunSettings::resolve(None, &CliOverrides::default());
        let dir = TempDir::new().unwrap();

        let config = settings.generator_config(Some("sk-test".into()), dir.path());
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(config.working_dir, dir.path());
    }
}
