use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use redraft_agent::{GenerationError, DEFAULT_TIMEOUT};
use redraft_critic::Scorer;
use redraft_logging::{LogEvent, Logger, RunTranscript, Stage, TranscriptHeader};

use crate::error::LoopError;
use crate::outcome::{RoundRecord, RunOutcome};
use crate::reviser::Reviser;
use crate::router::{Route, RoutePolicy, StopReason};
use crate::RefinementState;

/// Callback invoked with each committed round
pub type ProgressCallback = Arc<dyn Fn(&RoundRecord) + Send + Sync>;

/// A stage call that did not produce a result
struct StageFailure {
    stage: Stage,
    source: GenerationError,
}

/// Drives the reviser/scorer loop for one run at a time.
///
/// Rounds are strictly sequential. A round's results are committed to the
/// state only after both of its calls succeed, so a failure or cancellation
/// mid-round leaves the state at the last completed round.
pub struct LoopRunner<'a> {
    reviser: Reviser<'a>,
    scorer: Scorer<'a>,
    policy: RoutePolicy,
    call_timeout: Duration,
    logger: Arc<Logger>,
    transcript: Option<Arc<RunTranscript>>,
    on_round: Option<ProgressCallback>,
    interrupted: Arc<AtomicBool>,
}

impl<'a> LoopRunner<'a> {
    pub fn new(
        reviser: Reviser<'a>,
        scorer: Scorer<'a>,
        policy: RoutePolicy,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            reviser,
            scorer,
            policy,
            call_timeout: DEFAULT_TIMEOUT,
            logger,
            transcript: None,
            on_round: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Upper bound on each reviser or scorer call
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_transcript(mut self, transcript: Arc<RunTranscript>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Observe each committed round. Purely informational.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_round = Some(callback);
        self
    }

    /// Share an existing cancellation flag instead of the runner's own
    pub fn with_interrupt_handle(mut self, handle: Arc<AtomicBool>) -> Self {
        self.interrupted = handle;
        self
    }

    /// Get a handle to signal cancellation
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Run the loop from `seed_document` until a stop condition.
    ///
    /// Input is validated before any generation call. On a generation failure
    /// the error carries the state of the last completed round.
    pub async fn run(
        &self,
        target_spec: impl Into<String>,
        seed_document: impl Into<String>,
    ) -> Result<RunOutcome, LoopError> {
        self.policy.validate()?;
        let mut state = RefinementState::new(target_spec, seed_document)?;

        let started_at = Instant::now();
        let mut history: Vec<RoundRecord> = Vec::new();

        self.logger.log(&LogEvent::RunStarted {
            spec_preview: state.target_spec().chars().take(100).collect(),
            seed_chars: state.seed_document().chars().count(),
            generator: self.reviser.generator().name().to_string(),
            max_rounds: self.policy.max_rounds,
            score_threshold: self.policy.score_threshold,
        });
        if let Some(ref transcript) = self.transcript {
            transcript.write_start(&TranscriptHeader {
                target_spec: state.target_spec(),
                seed_document: state.seed_document(),
                generator: self.reviser.generator().name(),
                model: self.reviser.generator().model(),
                max_rounds: self.policy.max_rounds,
                score_threshold: self.policy.score_threshold,
            });
        }

        loop {
            if self.is_interrupted() {
                return Ok(self.cancelled(state, history, started_at));
            }

            let round = state.iteration() + 1;
            let record = match self.run_round(&state, round).await {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(self.cancelled(state, history, started_at)),
                Err(StageFailure { stage, source }) => {
                    warn!(round, %stage, error = %source, "Generation failed");
                    self.logger.log(&LogEvent::ErrorEncountered {
                        round,
                        stage,
                        error: source.to_string(),
                    });
                    self.finish_transcript("failed", &state, started_at);
                    return Err(LoopError::Generation {
                        stage,
                        round,
                        completed_rounds: state.iteration(),
                        state: Box::new(state),
                        source,
                    });
                }
            };

            // A result that arrives after cancellation is discarded
            if self.is_interrupted() {
                debug!(round, "Discarding round finished after cancellation");
                return Ok(self.cancelled(state, history, started_at));
            }

            self.commit(&mut state, &record);
            history.push(record);

            match self.policy.route(state.score(), state.iteration()) {
                Route::Continue => {
                    info!(
                        round,
                        score = state.score(),
                        "Continuing to next round"
                    );
                }
                Route::Stop(reason) => {
                    match reason {
                        StopReason::BudgetExhausted => {
                            self.logger.log(&LogEvent::BudgetExhausted {
                                rounds: state.iteration(),
                                score: state.score(),
                            });
                        }
                        _ => {
                            self.logger.log(&LogEvent::RunCompleted {
                                rounds: state.iteration(),
                                score: state.score(),
                                duration_secs: started_at.elapsed().as_secs_f64(),
                            });
                        }
                    }
                    self.finish_transcript(&reason.to_string(), &state, started_at);
                    return Ok(RunOutcome::new(reason, state, history, started_at.elapsed()));
                }
            }
        }
    }

    /// Run one reviser and one scorer call against `state` without mutating it.
    /// Returns `None` when cancellation was observed between the two calls.
    async fn run_round(
        &self,
        state: &RefinementState,
        round: usize,
    ) -> Result<Option<RoundRecord>, StageFailure> {
        self.logger.log(&LogEvent::RevisionStarted { round });
        let revise_start = Instant::now();
        let document = self
            .with_timeout(self.reviser.revise(state))
            .await
            .map_err(|source| StageFailure {
                stage: Stage::Reviser,
                source,
            })?;
        let revise_secs = revise_start.elapsed().as_secs_f64();
        self.logger.log(&LogEvent::RevisionCompleted {
            round,
            document_chars: document.chars().count(),
            duration_secs: revise_secs,
        });

        if self.is_interrupted() {
            return Ok(None);
        }

        self.logger.log(&LogEvent::ScoringStarted { round });
        let score_start = Instant::now();
        let verdict = self
            .with_timeout(self.scorer.score(state.target_spec(), &document))
            .await
            .map_err(|source| StageFailure {
                stage: Stage::Scorer,
                source,
            })?;
        let score_secs = score_start.elapsed().as_secs_f64();
        self.logger.log(&LogEvent::ScoringCompleted {
            round,
            score: verdict.score,
            critique: verdict.critique.clone(),
            parse_fallback: verdict.parse_fallback,
            duration_secs: score_secs,
        });

        Ok(Some(RoundRecord {
            iteration: round,
            document,
            score: verdict.score,
            critique: verdict.critique,
            parse_fallback: verdict.parse_fallback,
            revise_secs,
            score_secs,
        }))
    }

    /// Apply a finished round to the state and report it
    fn commit(&self, state: &mut RefinementState, record: &RoundRecord) {
        state.record_revision(record.document.clone());
        state.record_verdict(record.score, record.critique.clone());

        if let Some(ref transcript) = self.transcript {
            transcript.write_round(
                record.iteration,
                &record.document,
                record.score,
                &record.critique,
                record.parse_fallback,
                record.revise_secs,
                record.score_secs,
            );
        }
        if let Some(ref callback) = self.on_round {
            callback(record);
        }
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, GenerationError>>,
    ) -> Result<T, GenerationError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.call_timeout)),
        }
    }

    fn cancelled(
        &self,
        state: RefinementState,
        history: Vec<RoundRecord>,
        started_at: Instant,
    ) -> RunOutcome {
        info!(completed_rounds = state.iteration(), "Run cancelled");
        self.logger.log(&LogEvent::RunCancelled {
            completed_rounds: state.iteration(),
        });
        self.finish_transcript(&StopReason::Cancelled.to_string(), &state, started_at);
        RunOutcome::new(
            StopReason::Cancelled,
            state,
            history,
            started_at.elapsed(),
        )
    }

    fn finish_transcript(&self, outcome: &str, state: &RefinementState, started_at: Instant) {
        if let Some(ref transcript) = self.transcript {
            transcript.write_end(
                outcome,
                state.iteration(),
                state.score(),
                started_at.elapsed().as_secs_f64(),
            );
        }
    }
}
