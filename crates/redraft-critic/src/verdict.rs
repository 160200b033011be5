use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Lowest score a parsed verdict can carry
pub const MIN_SCORE: u8 = 1;

/// Highest score a parsed verdict can carry
pub const MAX_SCORE: u8 = 10;

/// Score substituted when the evaluator's reply has no score marker.
///
/// Mid-scale on purpose: it reads as "ambiguous, needs human review" rather
/// than as a pass or a fail.
pub const NEUTRAL_SCORE: u8 = 5;

/// Critique attached to a fallback verdict
pub const PARSE_FALLBACK_CRITIQUE: &str =
    "Automatic scoring failed: could not parse a score from the evaluator response. Review manually.";

fn score_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)SCORE:\s*([0-9]+)").expect("score pattern is valid"))
}

fn feedback_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)FEEDBACK:").expect("feedback pattern is valid"))
}

/// The Scorer's reading of one evaluator reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreVerdict {
    /// Quality score in `[MIN_SCORE, MAX_SCORE]`
    pub score: u8,
    /// Evaluator feedback with the score marker and labels removed
    pub critique: String,
    /// True when no score marker was found and the neutral default was used
    pub parse_fallback: bool,
}

impl ScoreVerdict {
    /// Parse a verdict from the evaluator's free-form reply.
    ///
    /// Expected shape (case and spacing are not significant):
    /// ```text
    /// SCORE: 7
    /// FEEDBACK: missing Kubernetes
    /// ```
    /// Never fails: a reply without a score marker yields [`ScoreVerdict::fallback`].
    pub fn parse(raw: &str) -> Self {
        debug!(output_len = raw.len(), "Parsing evaluator verdict");

        let Some(caps) = score_marker().captures(raw) else {
            warn!("No score marker in evaluator output, using neutral score");
            return Self::fallback();
        };

        // ASCII digits only fail to parse on overflow
        let score = caps[1]
            .parse::<u64>()
            .map(|n| n.clamp(MIN_SCORE as u64, MAX_SCORE as u64) as u8)
            .unwrap_or(MAX_SCORE);

        let without_score = score_marker().replace_all(raw, "");
        let critique = feedback_label()
            .replace_all(&without_score, "")
            .trim()
            .to_string();

        Self {
            score,
            critique,
            parse_fallback: false,
        }
    }

    /// Neutral verdict used when the reply cannot be read
    pub fn fallback() -> Self {
        Self {
            score: NEUTRAL_SCORE,
            critique: PARSE_FALLBACK_CRITIQUE.to_string(),
            parse_fallback: true,
        }
    }

    /// Get a short description of the verdict for logging
    pub fn short_description(&self) -> String {
        if self.parse_fallback {
            format!("{}/{} (parse fallback)", self.score, MAX_SCORE)
        } else {
            format!("{}/{}", self.score, MAX_SCORE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score_and_feedback() {
        let verdict = ScoreVerdict::parse("SCORE: 9\nFEEDBACK: good");
        assert_eq!(verdict.score, 9);
        assert_eq!(verdict.critique, "good");
        assert!(!verdict.parse_fallback);
    }

    #[test]
    fn test_parse_lowercase_without_space() {
        let verdict = ScoreVerdict::parse("score:10");
        assert_eq!(verdict.score, 10);
        assert_eq!(verdict.critique, "");
    }

    #[test]
    fn test_parse_inline_feedback() {
        let verdict = ScoreVerdict::parse("Score: 7 - missing X");
        assert_eq!(verdict.score, 7);
        assert_eq!(verdict.critique, "- missing X");
        assert!(!verdict.parse_fallback);
    }

    #[test]
    fn test_parse_without_marker_falls_back() {
        let verdict = ScoreVerdict::parse("Looks decent overall, but I can't say.");
        assert_eq!(verdict.score, NEUTRAL_SCORE);
        assert!(verdict.parse_fallback);
        assert!(verdict.critique.contains("Automatic scoring failed"));
    }

    #[test]
    fn test_parse_marker_anywhere_in_text() {
        let raw = "Checked the keywords.\n\n  SCORE:   8  \nFeedback: add Terraform";
        let verdict = ScoreVerdict::parse(raw);
        assert_eq!(verdict.score, 8);
        assert_eq!(verdict.critique, "Checked the keywords.\n\n    \n add Terraform");
    }

    #[test]
    fn test_parse_clamps_out_of_range_scores() {
        assert_eq!(ScoreVerdict::parse("SCORE: 0").score, MIN_SCORE);
        assert_eq!(ScoreVerdict::parse("SCORE: 42").score, MAX_SCORE);
        assert_eq!(
            ScoreVerdict::parse("SCORE: 99999999999999999999999").score,
            MAX_SCORE
        );
    }

    #[test]
    fn test_non_ascii_digits_fall_back() {
        // Arabic-Indic and fullwidth nine
        for raw in [
            "SCORE: \u{0669}\nFEEDBACK: missing X",
            "SCORE: \u{FF19}\nFEEDBACK: missing X",
        ] {
            let verdict = ScoreVerdict::parse(raw);
            assert_eq!(verdict.score, NEUTRAL_SCORE, "{raw:?}");
            assert!(verdict.parse_fallback, "{raw:?}");
        }
    }

    #[test]
    fn test_short_description() {
        assert_eq!(ScoreVerdict::parse("SCORE: 6").short_description(), "6/10");
        assert_eq!(
            ScoreVerdict::fallback().short_description(),
            "5/10 (parse fallback)"
        );
    }
}
