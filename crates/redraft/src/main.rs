use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing::warn;

use redraft_agent::{create_generator, BackendKind};
use redraft_core::{LoopError, LoopRunner, RefinementState, Reviser, RunOutcome, StopReason};
use redraft_critic::Scorer;
use redraft_logging::{init_tracing, LogFormat, Logger, RunTranscript, Stage};

mod config;

use config::{CliOverrides, ProjectConfig, RunSettings, CONFIG_FILE_NAME};

#[derive(Parser, Debug)]
#[command(
    name = "redraft",
    about = "Iteratively rewrite a document until it satisfies a target specification",
    version,
    author
)]
struct Cli {
    /// File holding the target specification
    #[arg(short, long)]
    spec: PathBuf,

    /// File holding the seed document
    #[arg(short, long)]
    document: PathBuf,

    /// Write the final document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of revise/score rounds
    #[arg(short = 'n', long)]
    max_rounds: Option<usize>,

    /// Score (1-10) at which the run stops early
    #[arg(long)]
    threshold: Option<u8>,

    /// Generation backend
    #[arg(long, value_enum)]
    backend: Option<BackendChoice>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of the chat-completions service
    #[arg(long)]
    endpoint: Option<String>,

    /// Timeout for a single request or command run, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Tracing level (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Dry run: show resolved settings without calling the model
    #[arg(long)]
    dry_run: bool,

    /// Also append run events as JSON lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not write a run transcript
    #[arg(long)]
    no_transcript: bool,

    /// Working directory (default: current directory)
    #[arg(long)]
    working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendChoice {
    Http,
    Command,
}

impl From<BackendChoice> for BackendKind {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Http => BackendKind::Http,
            BackendChoice::Command => BackendKind::Command,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            backend: self.backend.map(Into::into),
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            timeout_secs: self.timeout_secs,
            max_rounds: self.max_rounds,
            threshold: self.threshold,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    // Determine working directory
    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let project_config = ProjectConfig::load(&working_dir)?;
    let has_config_file = project_config.is_some();
    let settings = RunSettings::resolve(project_config, &cli.overrides());

    let target_spec = read_input(&working_dir, &cli.spec, "target specification")?;
    let seed_document = read_input(&working_dir, &cli.document, "seed document")?;

    // Reject bad input before anything is spent on generation
    if let Err(e) = settings
        .policy
        .validate()
        .and_then(|_| RefinementState::new(target_spec.as_str(), seed_document.as_str()))
    {
        report_error(&LoopError::from(e));
    }

    if cli.dry_run {
        print_dry_run(&settings, &working_dir, has_config_file, &target_spec, &seed_document);
        return Ok(());
    }

    let api_key = match settings.backend {
        BackendKind::Http => std::env::var(&settings.api_key_env).ok(),
        BackendKind::Command => None,
    };
    let generator_config = settings.generator_config(api_key, &working_dir);
    let generator = match create_generator(&generator_config) {
        Ok(generator) => generator,
        Err(e) => {
            eprintln!(
                "{} could not create {} generator: {} (set {} or use --backend command)",
                "error:".red().bold(),
                settings.backend,
                e,
                settings.api_key_env
            );
            std::process::exit(2);
        }
    };

    if !generator.is_available().await {
        anyhow::bail!(
            "Generator '{}' is not available. Make sure it's installed and in PATH.",
            generator.name()
        );
    }

    let logger = match cli.log_file {
        Some(ref path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };
    let logger = Arc::new(logger);

    let reviser = Reviser::new(generator.as_ref())
        .with_prompts(settings.prompts.clone())
        .with_preserved(settings.preserve.clone())
        .with_fence_language(settings.fence_language.clone());
    let scorer = Scorer::new(generator.as_ref())
        .with_prompts(settings.prompts.clone())
        .with_char_budget(settings.scorer_char_budget);

    let mut runner = LoopRunner::new(reviser, scorer, settings.policy, logger)
        .with_call_timeout(generator_config.call_budget());

    if !cli.no_transcript {
        match RunTranscript::new(&target_spec) {
            Ok(transcript) => {
                tracing::debug!(path = %transcript.path().display(), "Writing run transcript");
                runner = runner.with_transcript(Arc::new(transcript));
            }
            Err(e) => warn!(error = %e, "Could not create run transcript, continuing without one"),
        }
    }

    // Handle Ctrl+C gracefully
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current call...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let outcome = match runner.run(target_spec, seed_document).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Keep whatever the completed rounds produced
            if let (Some(state), Some(path)) = (e.last_state(), cli.output.as_ref()) {
                if state.iteration() > 0 {
                    write_document(path, state.current_document())?;
                    eprintln!(
                        "Saved round {} document to {}",
                        state.iteration(),
                        path.display()
                    );
                }
            }
            report_error(&e);
        }
    };

    if outcome.iterations() > 0 {
        match cli.output {
            Some(ref path) => write_document(path, outcome.final_document())?,
            None if !cli.json_output => println!("{}", outcome.final_document()),
            None => {}
        }
    }

    // Output result
    if cli.json_output {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    // Exit with appropriate code
    std::process::exit(outcome.exit_code());
}

fn read_input(working_dir: &Path, path: &Path, what: &str) -> Result<String> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    };

    std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))
}

fn write_document(path: &Path, document: &str) -> Result<()> {
    std::fs::write(path, document)
        .with_context(|| format!("Failed to write document to {}", path.display()))
}

/// Print a loop failure with the stage it came from and exit
fn report_error(err: &LoopError) -> ! {
    let stage = err.stage();
    eprintln!();
    eprintln!("{}", "=== FAILED ===".red().bold());
    eprintln!("Stage: {}", stage);
    eprintln!("Error: {}", err);
    if stage != Stage::Precondition {
        eprintln!("Completed rounds: {}", err.completed_rounds());
    }
    std::process::exit(err.exit_code());
}

fn print_dry_run(
    settings: &RunSettings,
    working_dir: &Path,
    has_config_file: bool,
    target_spec: &str,
    seed_document: &str,
) {
    println!("=== Dry Run ===");
    println!("Working dir: {}", working_dir.display());
    println!(
        "Config file: {}",
        if has_config_file {
            CONFIG_FILE_NAME
        } else {
            "(none)"
        }
    );
    println!(
        "Target spec: {} chars, seed document: {} chars",
        target_spec.chars().count(),
        seed_document.chars().count()
    );
    println!("Backend: {}", settings.backend);
    match settings.backend {
        BackendKind::Http => {
            println!("Endpoint: {}", settings.endpoint);
            println!("API key env: {}", settings.api_key_env);
        }
        BackendKind::Command => {
            println!(
                "Command: {} {}",
                settings.command.display(),
                settings.args.join(" ")
            );
        }
    }
    println!("Model: {}", settings.model.as_deref().unwrap_or("(agent default)"));
    println!(
        "Timeout: {}s per request, {}s per call including retries",
        settings.timeout.as_secs(),
        settings
            .generator_config(None, working_dir)
            .call_budget()
            .as_secs()
    );
    println!("Max rounds: {}", settings.policy.max_rounds);
    println!("Score threshold: {}", settings.policy.score_threshold);
    println!("Scorer char budget: {}", settings.scorer_char_budget);
    println!("Fence language: {}", settings.fence_language);
    println!("Preserve: {}", settings.preserve.join("; "));
}

fn print_outcome(outcome: &RunOutcome) {
    let header = match outcome.stop_reason {
        StopReason::ThresholdMet => "=== THRESHOLD MET ===".green().bold(),
        StopReason::BudgetExhausted => "=== ROUND BUDGET EXHAUSTED ===".yellow().bold(),
        StopReason::Cancelled => "=== CANCELLED ===".yellow().bold(),
    };

    eprintln!();
    eprintln!("{}", header);
    eprintln!("Rounds: {}", outcome.iterations());
    if outcome.iterations() > 0 {
        eprintln!("Final score: {}/10", outcome.state.score());
        eprintln!("Critique: {}", outcome.state.critique());
    }
    eprintln!("Duration: {:.1}s", outcome.total_duration_secs);
    if outcome.stop_reason == StopReason::BudgetExhausted {
        eprintln!("The document may not satisfy every requirement.");
    }
}
