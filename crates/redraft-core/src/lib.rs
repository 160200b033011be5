mod error;
mod loop_runner;
mod outcome;
mod reviser;
mod router;
mod state;

pub use error::{LoopError, PreconditionError};
pub use loop_runner::{LoopRunner, ProgressCallback};
pub use outcome::{RoundRecord, RunOutcome};
pub use reviser::{default_preserved_fields, strip_fences, Reviser, DEFAULT_FENCE_LANGUAGE};
pub use router::{
    Route, RoutePolicy, StopReason, DEFAULT_MAX_ROUNDS, DEFAULT_SCORE_THRESHOLD,
};
pub use state::RefinementState;
