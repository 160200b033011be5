use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Stage of a refinement round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Precondition,
    Reviser,
    Scorer,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Precondition => write!(f, "precondition"),
            Stage::Reviser => write!(f, "reviser"),
            Stage::Scorer => write!(f, "scorer"),
        }
    }
}

/// Structured log events for the refinement loop.
///
/// `round` is 1-based: the round that produces the n-th draft is round n.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted {
        spec_preview: String,
        seed_chars: usize,
        generator: String,
        max_rounds: usize,
        score_threshold: u8,
    },
    RevisionStarted {
        round: usize,
    },
    RevisionCompleted {
        round: usize,
        document_chars: usize,
        duration_secs: f64,
    },
    ScoringStarted {
        round: usize,
    },
    ScoringCompleted {
        round: usize,
        score: u8,
        critique: String,
        parse_fallback: bool,
        duration_secs: f64,
    },
    RunCompleted {
        rounds: usize,
        score: u8,
        duration_secs: f64,
    },
    BudgetExhausted {
        rounds: usize,
        score: u8,
    },
    RunCancelled {
        completed_rounds: usize,
    },
    ErrorEncountered {
        round: usize,
        stage: Stage,
        error: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for redraft events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
    console: bool,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
            console: true,
        }
    }

    /// Logger that discards everything (used by tests and library callers)
    pub fn silent() -> Self {
        Self {
            format: LogFormat::Compact,
            file_writer: None,
            console: false,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
            console: true,
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if !self.console {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::RunStarted {
                spec_preview,
                seed_chars,
                generator,
                max_rounds,
                score_threshold,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "redraft".bold().bright_white(),
                    " ".repeat(60) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Spec:".dimmed(),
                    Self::truncate_with_padding(spec_preview, 60, 67).dimmed()
                );
                let details = format!(
                    "{} chars, {}, up to {} rounds, target {}/10",
                    seed_chars, generator, max_rounds, score_threshold
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Seed:".dimmed(),
                    Self::truncate_with_padding(&details, 60, 67).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::RevisionStarted { round } => {
                let round_text = format!("─ Round {} ", round);
                let padding = "─".repeat(67usize.saturating_sub(round_text.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    round_text.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "REVISER".bright_cyan().bold()
                );
            }
            LogEvent::RevisionCompleted {
                document_chars,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} Draft ready, {} chars ({:.1}s)",
                    "✓".bright_green(),
                    document_chars,
                    duration_secs
                );
                let _ = writeln!(stderr);
            }
            LogEvent::ScoringStarted { .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "SCORER".bright_magenta().bold()
                );
            }
            LogEvent::ScoringCompleted {
                score,
                critique,
                parse_fallback,
                duration_secs,
                ..
            } => {
                let headline = format!("Score: {}/10 ({:.1}s)", score, duration_secs);
                let styled = if *parse_fallback {
                    format!("? {} - scoring failed, review manually", headline)
                        .bright_yellow()
                        .to_string()
                } else if *score >= 10 {
                    format!("✓ {}", headline).bright_green().to_string()
                } else {
                    format!("→ {}", headline).bright_yellow().to_string()
                };
                let _ = writeln!(stderr, "    {}", styled);
                for line in critique.lines().filter(|l| !l.trim().is_empty()).take(6) {
                    let _ = writeln!(stderr, "{} {}", "    │".dimmed(), line.dimmed());
                }
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "└─────────────────────────────────────────────────────────────────────┘"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::RunCompleted { .. } => {
                // The final outcome is printed by the binary
            }
            LogEvent::BudgetExhausted { rounds, score } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Round budget exhausted after {} rounds (last score {}/10)",
                    "⚠".bright_yellow(),
                    rounds,
                    score
                );
            }
            LogEvent::RunCancelled { completed_rounds } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Cancelled after {} completed round(s)",
                    "⚠".bright_yellow(),
                    completed_rounds
                );
            }
            LogEvent::ErrorEncountered {
                round,
                stage,
                error,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {} failed in round {}: {}",
                    "✗".bright_red(),
                    stage,
                    round,
                    error.bright_red()
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::RunStarted { max_rounds, .. } => {
                format!("[{}] run:start max={}", timestamp, max_rounds)
            }
            LogEvent::RevisionStarted { round } => {
                format!("[{}] revise:start:{}", timestamp, round)
            }
            LogEvent::RevisionCompleted {
                round,
                document_chars,
                duration_secs,
            } => format!(
                "[{}] revise:done:{} chars={} {:.1}s",
                timestamp, round, document_chars, duration_secs
            ),
            LogEvent::ScoringStarted { round } => {
                format!("[{}] score:start:{}", timestamp, round)
            }
            LogEvent::ScoringCompleted {
                round,
                score,
                parse_fallback,
                ..
            } => format!(
                "[{}] score:done:{} {}{}",
                timestamp,
                round,
                score,
                if *parse_fallback { " fallback" } else { "" }
            ),
            LogEvent::RunCompleted {
                rounds,
                score,
                duration_secs,
            } => format!(
                "[{}] run:done:{} score={} {:.1}s",
                timestamp, rounds, score, duration_secs
            ),
            LogEvent::BudgetExhausted { rounds, score } => {
                format!("[{}] run:limit:{} score={}", timestamp, rounds, score)
            }
            LogEvent::RunCancelled { completed_rounds } => {
                format!("[{}] run:cancelled:{}", timestamp, completed_rounds)
            }
            LogEvent::ErrorEncountered {
                round,
                stage,
                error,
            } => format!("[{}] error:{}:{}:{}", timestamp, stage, round, error),
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let first_line = s.lines().next().unwrap_or("");
        let truncated = if first_line.chars().count() > max_len {
            let head: String = first_line.chars().take(max_len - 3).collect();
            format!("{}...", head)
        } else {
            first_line.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}
