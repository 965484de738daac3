//! Stage executor: one stage, its failure policy and the retry loop
//!
//! Stages never retry on their own. The executor decides from the stage's
//! policy and the error kind whether another attempt is allowed, waits out an
//! exponential backoff and gives up on cancellation or stage timeout.

use crate::config::PipelineConfig;
use crate::error::{PlanningError, Retry};
use crate::gateway::Gateway;
use crate::stages::{FailurePolicy, Stage, StageId};
use crate::state::{Artifact, TripState};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Successful stage run
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: StageId,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Final error of a stage once no attempt is left
#[derive(Debug)]
pub struct StageError {
    pub error: PlanningError,
    pub attempts: u32,
}

pub struct StageExecutor {
    config: PipelineConfig,
}

impl StageExecutor {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Attempts allowed for a stage whose last attempt failed with `retry`.
    pub fn attempt_limit(&self, policy: FailurePolicy, retry: Retry) -> u32 {
        let max = self.config.max_stage_attempts.max(1);
        match (policy, retry) {
            (FailurePolicy::Fatal, _) | (_, Retry::Never) => 1,
            (FailurePolicy::Retryable, Retry::Once) => max.min(2),
            (FailurePolicy::Retryable, Retry::Transient) => max,
        }
    }

    /// Delay before attempt `attempt + 1`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.config.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    pub async fn execute(
        &self,
        stage: &dyn Stage,
        state: &TripState,
        gateway: &Gateway,
        cancel: &CancellationToken,
    ) -> std::result::Result<(Artifact, StageReport), StageError> {
        let id = stage.id();
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(stage = %id, attempt, "Running stage");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PlanningError::Cancelled),
                result = tokio::time::timeout(self.config.stage_timeout, stage.run(state, gateway)) => {
                    match result {
                        Ok(result) => result,
                        Err(_) => Err(PlanningError::CapabilityUnavailable(format!(
                            "{} timed out after {:?}",
                            id, self.config.stage_timeout
                        ))),
                    }
                }
            };

            let error = match outcome {
                Ok(artifact) => {
                    let report = StageReport {
                        stage: id,
                        attempts: attempt,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    };
                    return Ok((artifact, report));
                }
                Err(error) => error,
            };

            let limit = self.attempt_limit(stage.policy(), error.kind().retry());
            if attempt >= limit {
                return Err(StageError {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.backoff(attempt);
            warn!(
                stage = %id,
                attempt,
                limit,
                kind = %error.kind(),
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Stage failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StageError {
                        error: PlanningError::Cancelled,
                        attempts: attempt,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
