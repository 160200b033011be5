use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{RefinementState, StopReason};

/// Record of a single completed round, also emitted as the progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Iteration count after this round (1 for the first round)
    pub iteration: usize,
    pub document: String,
    pub score: u8,
    pub critique: String,
    /// The scorer's reply had no score marker; `score` is the neutral default
    pub parse_fallback: bool,
    pub revise_secs: f64,
    pub score_secs: f64,
}

/// The terminal result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub stop_reason: StopReason,
    /// Terminal state, exactly as the last committed round left it
    pub state: RefinementState,
    #[serde(skip)]
    pub history: Vec<RoundRecord>,
    pub total_duration_secs: f64,
}

impl RunOutcome {
    pub fn new(
        stop_reason: StopReason,
        state: RefinementState,
        history: Vec<RoundRecord>,
        duration: Duration,
    ) -> Self {
        Self {
            stop_reason,
            state,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn iterations(&self) -> usize {
        self.state.iteration()
    }

    pub fn final_document(&self) -> &str {
        self.state.current_document()
    }

    pub fn is_success(&self) -> bool {
        self.stop_reason == StopReason::ThresholdMet
    }

    pub fn exit_code(&self) -> i32 {
        match self.stop_reason {
            StopReason::ThresholdMet => 0,
            StopReason::BudgetExhausted => 1,
            StopReason::Cancelled => 130,
        }
    }
}
