use redraft_agent::GenerationError;
use redraft_logging::Stage;
use thiserror::Error;

use crate::RefinementState;

/// Problems with run input, detected before any generation call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("target specification is empty")]
    EmptyTargetSpec,

    #[error("seed document is empty")]
    EmptySeedDocument,

    #[error("max_rounds must be at least 1")]
    ZeroRounds,

    #[error("score threshold must be between 1 and 10, got {0}")]
    ThresholdOutOfRange(u8),
}

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("{stage} failed in round {round} ({completed_rounds} round(s) completed): {source}")]
    Generation {
        stage: Stage,
        /// Round that was in progress (1-based)
        round: usize,
        completed_rounds: usize,
        /// State as of the last completed round
        state: Box<RefinementState>,
        #[source]
        source: GenerationError,
    },
}

impl LoopError {
    /// Stage the failure originated in
    pub fn stage(&self) -> Stage {
        match self {
            LoopError::Precondition(_) => Stage::Precondition,
            LoopError::Generation { stage, .. } => *stage,
        }
    }

    pub fn completed_rounds(&self) -> usize {
        match self {
            LoopError::Precondition(_) => 0,
            LoopError::Generation {
                completed_rounds, ..
            } => *completed_rounds,
        }
    }

    /// State of the last completed round; `None` when no state was created
    pub fn last_state(&self) -> Option<&RefinementState> {
        match self {
            LoopError::Precondition(_) => None,
            LoopError::Generation { state, .. } => Some(state.as_ref()),
        }
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}
