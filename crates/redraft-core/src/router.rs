use redraft_critic::MAX_SCORE;
use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;

pub const DEFAULT_MAX_ROUNDS: usize = 3;
pub const DEFAULT_SCORE_THRESHOLD: u8 = MAX_SCORE;

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The latest score reached the threshold
    ThresholdMet,
    /// The round budget ran out first
    BudgetExhausted,
    /// The caller cancelled the run between rounds
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::ThresholdMet => write!(f, "threshold_met"),
            StopReason::BudgetExhausted => write!(f, "budget_exhausted"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Routing decision after a scored round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Go back to the reviser
    Continue,
    Stop(StopReason),
}

/// Stop rules for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub max_rounds: usize,
    pub score_threshold: u8,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl RoutePolicy {
    pub fn new(max_rounds: usize, score_threshold: u8) -> Self {
        Self {
            max_rounds,
            score_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), PreconditionError> {
        if self.max_rounds == 0 {
            return Err(PreconditionError::ZeroRounds);
        }
        if self.score_threshold == 0 || self.score_threshold > MAX_SCORE {
            return Err(PreconditionError::ThresholdOutOfRange(self.score_threshold));
        }
        Ok(())
    }

    /// Decide whether to run another round.
    ///
    /// The threshold is checked before the budget, so a passing score on the
    /// last allowed round is reported as `ThresholdMet`.
    pub fn route(&self, score: u8, iteration: usize) -> Route {
        if score >= self.score_threshold {
            Route::Stop(StopReason::ThresholdMet)
        } else if iteration >= self.max_rounds {
            Route::Stop(StopReason::BudgetExhausted)
        } else {
            Route::Continue
        }
    }
}
