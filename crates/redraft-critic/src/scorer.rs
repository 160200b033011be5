use redraft_agent::{GenerationError, Generator};
use tracing::{debug, info};

use crate::prompts::truncate_chars;
use crate::{PromptTemplates, ScoreVerdict};

/// Default number of document characters sent for evaluation
pub const DEFAULT_CHAR_BUDGET: usize = 4000;

/// Grades a candidate document against the target specification
pub struct Scorer<'a> {
    generator: &'a dyn Generator,
    prompts: PromptTemplates,
    char_budget: usize,
}

impl<'a> Scorer<'a> {
    pub fn new(generator: &'a dyn Generator) -> Self {
        Self {
            generator,
            prompts: PromptTemplates::default(),
            char_budget: DEFAULT_CHAR_BUDGET,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    /// Cap on how much of the candidate the evaluator sees.
    ///
    /// Only this prefix is sent to bound the cost of each call. Requirements
    /// satisfied past the cut are invisible to the evaluator; that is an
    /// accepted sampling trade-off, not a correctness guarantee.
    pub fn with_char_budget(mut self, char_budget: usize) -> Self {
        self.char_budget = char_budget;
        self
    }

    pub fn char_budget(&self) -> usize {
        self.char_budget
    }

    /// Score `candidate` against `spec`.
    ///
    /// Only a failed generation call is an error; an unreadable reply becomes a
    /// fallback verdict.
    pub async fn score(&self, spec: &str, candidate: &str) -> Result<ScoreVerdict, GenerationError> {
        let excerpt = truncate_chars(candidate, self.char_budget);
        let prompt = self.prompts.build_scoring_prompt(spec, excerpt);

        debug!(
            prompt_len = prompt.len(),
            candidate_len = candidate.len(),
            excerpt_len = excerpt.len(),
            "Running scorer"
        );

        let raw = self.generator.generate(&prompt).await?;
        let verdict = ScoreVerdict::parse(&raw);

        info!(verdict = %verdict.short_description(), "Scorer completed");

        Ok(verdict)
    }
}
