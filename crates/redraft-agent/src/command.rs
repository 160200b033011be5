use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::{GenerationError, Generator, GeneratorConfig, ProcessSpawner};

/// Generator backed by a local agent CLI (e.g. `claude --print`)
pub struct CommandGenerator {
    binary_path: PathBuf,
    config: GeneratorConfig,
}

impl CommandGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            binary_path: config.command.clone(),
            config: config.clone(),
        }
    }

    /// Full argument list for one prompt
    fn build_args<'a>(&'a self, prompt: &'a str) -> Vec<&'a str> {
        let mut args: Vec<&str> = self.config.args.iter().map(String::as_str).collect();

        if let Some(ref model) = self.config.model {
            args.push("--model");
            args.push(model);
        }

        // End of options, so prompts starting with '-' are not read as flags
        args.push("--");
        args.push(prompt);
        args
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    fn name(&self) -> &str {
        "Agent CLI"
    }

    fn model(&self) -> Option<&str> {
        self.config.model.as_deref()
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(
            generator = self.name(),
            prompt_len = prompt.len(),
            "Executing generator command"
        );

        let args = self.build_args(prompt);
        let output = ProcessSpawner::spawn(&self.binary_path, &args, &self.config).await?;

        if !output.success() {
            return Err(GenerationError::Execution(format!(
                "{} exited with code {}: {}",
                self.binary_path.display(),
                output.exit_code,
                output.stderr_tail(5)
            )));
        }

        let text = output.stdout.trim();
        if text.is_empty() {
            return Err(GenerationError::MalformedResponse(
                "generator command produced no output".into(),
            ));
        }

        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendKind;

    #[test]
    fn test_build_args_places_prompt_last() {
        let config = GeneratorConfig::new(BackendKind::Command)
            .with_command(PathBuf::from("claude"), vec!["--print".into()])
            .with_model("sonnet");
        let generator = CommandGenerator::from_config(&config);

        let args = generator.build_args("-rewrite this");
        assert_eq!(args, vec!["--print", "--model", "sonnet", "--", "-rewrite this"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_returns_trimmed_stdout() {
        let config = GeneratorConfig {
            model: None,
            ..GeneratorConfig::new(BackendKind::Command)
        }
        .with_command(PathBuf::from("echo"), vec![]);
        let generator = CommandGenerator::from_config(&config);

        let text = generator.generate("hello").await.unwrap();
        assert_eq!(text, "-- hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_reports_nonzero_exit() {
        let config = GeneratorConfig {
            model: None,
            ..GeneratorConfig::new(BackendKind::Command)
        }
        .with_command(PathBuf::from("false"), vec![]);
        let generator = CommandGenerator::from_config(&config);

        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, GenerationError::Execution(_)));
    }

    #[tokio::test]
    async fn test_generate_reports_missing_binary() {
        let config = GeneratorConfig {
            model: None,
            ..GeneratorConfig::new(BackendKind::Command)
        }
        .with_command(PathBuf::from("/nonexistent/redraft-generator"), vec![]);
        let generator = CommandGenerator::from_config(&config);

        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, GenerationError::Spawn(_)));
    }
}
