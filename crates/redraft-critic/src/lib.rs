mod prompts;
mod scorer;
mod verdict;

pub use prompts::{
    truncate_chars, PromptTemplates, DEFAULT_REVISER_TEMPLATE, DEFAULT_SCORER_TEMPLATE,
    FIRST_DRAFT_FEEDBACK,
};
pub use scorer::{Scorer, DEFAULT_CHAR_BUDGET};
pub use verdict::{
    ScoreVerdict, MAX_SCORE, MIN_SCORE, NEUTRAL_SCORE, PARSE_FALLBACK_CRITIQUE,
};
