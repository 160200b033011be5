use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Represents each line type in the run transcript JSONL file.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptLine {
    RunStart {
        timestamp: DateTime<Utc>,
        target_spec_chars: usize,
        seed_document_chars: usize,
        generator: String,
        model: Option<String>,
        max_rounds: usize,
        score_threshold: u8,
    },
    Round {
        iteration: usize,
        document: String,
        score: u8,
        critique: String,
        parse_fallback: bool,
        revise_secs: f64,
        score_secs: f64,
        timestamp: DateTime<Utc>,
    },
    RunEnd {
        outcome: String,
        iterations: usize,
        score: u8,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Settings recorded in the transcript header
#[derive(Debug, Clone)]
pub struct TranscriptHeader<'a> {
    pub target_spec: &'a str,
    pub seed_document: &'a str,
    pub generator: &'a str,
    pub model: Option<&'a str>,
    pub max_rounds: usize,
    pub score_threshold: u8,
}

/// Writes a run as JSONL to a file in ~/.local/share/redraft/runs/.
///
/// A transcript is a log of what happened; nothing reads it back to resume a
/// run. Write failures are swallowed so they can never fail the run itself.
pub struct RunTranscript {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl RunTranscript {
    /// Create a transcript in the default runs directory. The file name is the
    /// current UTC timestamp plus a short hash of the target specification.
    pub fn new(target_spec: &str) -> io::Result<Self> {
        Self::in_dir(&Self::runs_dir()?, target_spec)
    }

    /// Create a transcript in `dir`
    pub fn in_dir(dir: &Path, target_spec: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let timestamp_str = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(target_spec.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let short_hash = &hash[..6];

        let filename = format!("{}_{}.jsonl", timestamp_str, short_hash);
        let path = dir.join(filename);

        let file = File::create(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Returns the path to the transcript file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_start(&self, header: &TranscriptHeader<'_>) {
        let line = TranscriptLine::RunStart {
            timestamp: Utc::now(),
            target_spec_chars: header.target_spec.chars().count(),
            seed_document_chars: header.seed_document.chars().count(),
            generator: header.generator.to_string(),
            model: header.model.map(String::from),
            max_rounds: header.max_rounds,
            score_threshold: header.score_threshold,
        };
        self.write_line(&line);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_round(
        &self,
        iteration: usize,
        document: &str,
        score: u8,
        critique: &str,
        parse_fallback: bool,
        revise_secs: f64,
        score_secs: f64,
    ) {
        let line = TranscriptLine::Round {
            iteration,
            document: document.to_string(),
            score,
            critique: critique.to_string(),
            parse_fallback,
            revise_secs,
            score_secs,
            timestamp: Utc::now(),
        };
        self.write_line(&line);
    }

    pub fn write_end(&self, outcome: &str, iterations: usize, score: u8, duration_secs: f64) {
        let line = TranscriptLine::RunEnd {
            outcome: outcome.to_string(),
            iterations,
            score,
            duration_secs,
            timestamp: Utc::now(),
        };
        self.write_line(&line);
    }

    fn write_line(&self, line: &TranscriptLine) {
        let json = match serde_json::to_string(line) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize transcript line");
                return;
            }
        };
        if let Ok(mut writer) = self.file.lock() {
            if let Err(e) = writeln!(writer, "{}", json).and_then(|_| writer.flush()) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to write transcript");
            }
        }
    }

    fn runs_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("redraft").join("runs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_transcript_lines() {
        let dir = TempDir::new().unwrap();
        let transcript = RunTranscript::in_dir(dir.path(), "needs Rust").unwrap();

        let name = transcript.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".jsonl"));

        transcript.write_start(&TranscriptHeader {
            target_spec: "needs Rust",
            seed_document: "résumé",
            generator: "stub",
            model: Some("gpt-4o"),
            max_rounds: 3,
            score_threshold: 10,
        });
        transcript.write_round(1, "draft one", 7, "missing X", false, 1.0, 0.5);
        transcript.write_end("threshold_met", 1, 10, 2.0);

        let content = fs::read_to_string(transcript.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "run_start");
        assert_eq!(lines[0]["seed_document_chars"], 6);
        assert_eq!(lines[0]["model"], "gpt-4o");
        assert_eq!(lines[1]["type"], "round");
        assert_eq!(lines[1]["document"], "draft one");
        assert_eq!(lines[1]["score"], 7);
        assert_eq!(lines[2]["type"], "run_end");
        assert_eq!(lines[2]["outcome"], "threshold_met");
    }

    #[test]
    fn test_transcript_name_hashes_spec() {
        let dir = TempDir::new().unwrap();
        let transcript = RunTranscript::in_dir(dir.path(), "spec").unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"spec");
        let expected = &hex::encode(hasher.finalize())[..6];

        let name = transcript.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains(expected));
    }
}
