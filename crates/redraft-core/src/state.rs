use serde::Serialize;

use crate::error::PreconditionError;

/// The record threaded through every round of a run.
///
/// `target_spec` and `seed_document` are fixed at construction and have no
/// setters. The remaining fields change only when a round is committed.
/// Serialize-only: the sole way to obtain one is [`RefinementState::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefinementState {
    target_spec: String,
    seed_document: String,
    /// Best candidate so far (empty until round 1 completes)
    current_document: String,
    /// Feedback from the most recent scoring (empty before round 1)
    critique: String,
    /// 0 until the first scoring, then 1..=10
    score: u8,
    /// Number of revisions applied so far
    iteration: usize,
}

impl RefinementState {
    /// Start a run. Both inputs must contain something other than whitespace.
    pub fn new(
        target_spec: impl Into<String>,
        seed_document: impl Into<String>,
    ) -> Result<Self, PreconditionError> {
        let target_spec = target_spec.into();
        let seed_document = seed_document.into();

        if target_spec.trim().is_empty() {
            return Err(PreconditionError::EmptyTargetSpec);
        }
        if seed_document.trim().is_empty() {
            return Err(PreconditionError::EmptySeedDocument);
        }

        Ok(Self {
            target_spec,
            seed_document,
            current_document: String::new(),
            critique: String::new(),
            score: 0,
            iteration: 0,
        })
    }

    pub fn target_spec(&self) -> &str {
        &self.target_spec
    }

    pub fn seed_document(&self) -> &str {
        &self.seed_document
    }

    pub fn current_document(&self) -> &str {
        &self.current_document
    }

    pub fn critique(&self) -> &str {
        &self.critique
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Document the next revision starts from.
    /// First revision uses the seed, later ones the current best draft.
    pub fn source_document(&self) -> &str {
        if self.iteration == 0 {
            &self.seed_document
        } else {
            &self.current_document
        }
    }

    /// Critique to hand the next revision, if one has been produced
    pub fn latest_critique(&self) -> Option<&str> {
        if self.iteration == 0 {
            None
        } else {
            Some(&self.critique)
        }
    }

    /// Apply a revision: replaces the draft and advances the counter by one
    pub(crate) fn record_revision(&mut self, document: String) {
        self.current_document = document;
        self.iteration += 1;
    }

    /// Apply a verdict; it fully replaces the previous score and critique
    pub(crate) fn record_verdict(&mut self, score: u8, critique: String) {
        self.score = score;
        self.critique = critique;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = RefinementState::new("spec", "seed").unwrap();
        assert_eq!(state.iteration(), 0);
        assert_eq!(state.score(), 0);
        assert_eq!(state.current_document(), "");
        assert_eq!(state.critique(), "");
        assert_eq!(state.source_document(), "seed");
        assert_eq!(state.latest_critique(), None);
    }

    #[test]
    fn test_rejects_blank_inputs() {
        assert_eq!(
            RefinementState::new("  \n", "seed").unwrap_err(),
            PreconditionError::EmptyTargetSpec
        );
        assert_eq!(
            RefinementState::new("spec", "").unwrap_err(),
            PreconditionError::EmptySeedDocument
        );
    }

    #[test]
    fn test_source_switches_after_first_revision() {
        let mut state = RefinementState::new("spec", "seed").unwrap();
        state.record_revision("draft 1".into());
        state.record_verdict(6, "add X".into());

        assert_eq!(state.iteration(), 1);
        assert_eq!(state.source_document(), "draft 1");
        assert_eq!(state.latest_critique(), Some("add X"));
        assert_eq!(state.seed_document(), "seed");
    }

    #[test]
    fn test_verdict_replaces_previous_score() {
        let mut state = RefinementState::new("spec", "seed").unwrap();
        state.record_revision("d1".into());
        state.record_verdict(9, "close".into());
        state.record_revision("d2".into());
        state.record_verdict(4, "regressed".into());

        assert_eq!(state.score(), 4);
        assert_eq!(state.critique(), "regressed");
        assert_eq!(state.iteration(), 2);
    }
}
