//! Main orchestrator - runs the planning pipeline
//!
//! INPUT → ANALYZE → RESEARCH → FIND → ALLOCATE → BUILD → COMPLETE
//!
//! Stages run strictly in order against one trip state per run. A stage's
//! artifact is written only after the stage has succeeded.

use crate::audit::{AuditLog, PlanningOutcome, PlanningRecord};
use crate::config::{PipelineConfig, PlannerConfig};
use crate::error::{PlanningError, PlanningFailure};
use crate::execution::{StageError, StageExecutor, StageReport};
use crate::gateway::Gateway;
use crate::models::{Itinerary, TripRequest};
use crate::stages::{default_stages, Stage, StageId};
use crate::state::TripState;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bookkeeping for one run, flushed to the audit log at the end.
struct RunLog {
    request: Arc<TripRequest>,
    started: Instant,
    reasoning_trace: Vec<String>,
    stage_reports: Vec<StageReport>,
}

impl RunLog {
    fn new(request: Arc<TripRequest>) -> Self {
        Self {
            request,
            started: Instant::now(),
            reasoning_trace: vec!["INPUT: Trip request received".to_string()],
            stage_reports: Vec::new(),
        }
    }

    fn into_record(self, outcome: PlanningOutcome) -> PlanningRecord {
        PlanningRecord::new(
            self.request,
            outcome,
            self.stage_reports,
            self.reasoning_trace,
            self.started.elapsed().as_millis() as u64,
        )
    }
}

/// Main orchestrator that coordinates the planning pipeline
pub struct Orchestrator {
    gateway: Arc<Gateway>,
    stages: Vec<Box<dyn Stage>>,
    executor: StageExecutor,
    audit_log: AuditLog,
}

impl Orchestrator {
    /// The five default stages, tuned from `config`.
    pub fn new(gateway: Arc<Gateway>, config: &PlannerConfig) -> Self {
        Self {
            gateway,
            stages: default_stages(&config.schedule),
            executor: StageExecutor::new(config.pipeline.clone()),
            audit_log: AuditLog::with_capacity(config.pipeline.audit_capacity),
        }
    }

    /// A custom stage list. It must name every stage once, in pipeline order.
    pub fn with_stages(
        gateway: Arc<Gateway>,
        stages: Vec<Box<dyn Stage>>,
        pipeline: PipelineConfig,
    ) -> Result<Self> {
        let ids: Vec<StageId> = stages.iter().map(|s| s.id()).collect();
        if ids != StageId::ORDER {
            return Err(PlanningError::InvariantViolation(format!(
                "stages must run in order {:?}, got {:?}",
                StageId::ORDER,
                ids
            )));
        }

        Ok(Self {
            gateway,
            stages,
            audit_log: AuditLog::with_capacity(pipeline.audit_capacity),
            executor: StageExecutor::new(pipeline),
        })
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    /// Plan a trip end to end.
    pub async fn plan(&self, request: TripRequest) -> std::result::Result<Itinerary, PlanningFailure> {
        self.plan_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Plan a trip, giving up with `Cancelled` as soon as `cancel` fires.
    pub async fn plan_with_cancellation(
        &self,
        request: TripRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Itinerary, PlanningFailure> {
        info!(
            request_id = %request.request_id,
            destinations = ?request.destinations,
            days = request.total_days(),
            "Orchestrator: starting planning run"
        );

        let mut log = RunLog::new(Arc::new(request.clone()));
        let mut state = TripState::new(request);

        for stage in &self.stages {
            let id = stage.id();

            if let Err(e) = state.ready_for(id) {
                return Err(self.fail(log, id, &e, 0, state).await);
            }

            debug!(stage = %id, "Stage starting");

            match self
                .executor
                .execute(stage.as_ref(), &state, &self.gateway, &cancel)
                .await
            {
                Ok((artifact, report)) => {
                    if let Err(e) = state.apply(artifact) {
                        return Err(self.fail(log, id, &e, report.attempts, state).await);
                    }

                    log.reasoning_trace.push(format!(
                        "STAGE {}: ok after {} attempt(s)",
                        id, report.attempts
                    ));
                    info!(
                        stage = %id,
                        attempts = report.attempts,
                        elapsed_ms = report.elapsed_ms,
                        "Stage complete"
                    );
                    log.stage_reports.push(report);
                }
                Err(StageError { error, attempts }) => {
                    return Err(self.fail(log, id, &error, attempts, state).await);
                }
            }
        }

        let itinerary = match state.into_itinerary() {
            Ok(itinerary) => itinerary,
            Err(state) => {
                let e = PlanningError::InvariantViolation(
                    "pipeline ended without an itinerary".to_string(),
                );
                return Err(self.fail(log, StageId::ItineraryBuilder, &e, 0, state).await);
            }
        };

        log.reasoning_trace.push(format!(
            "COMPLETE: {} day(s), total cost {:.2}",
            itinerary.days.len(),
            itinerary.total_cost
        ));

        let record = log.into_record(PlanningOutcome::Success {
            days: itinerary.days.len(),
            total_cost: itinerary.total_cost,
        });
        self.store(record).await;

        info!(
            trip_id = %itinerary.trip_id,
            days = itinerary.days.len(),
            total_cost = itinerary.total_cost,
            "Planning run complete"
        );

        Ok(itinerary)
    }

    async fn fail(
        &self,
        mut log: RunLog,
        stage: StageId,
        error: &PlanningError,
        attempts: u32,
        state: TripState,
    ) -> PlanningFailure {
        let failure = PlanningFailure::new(stage, error, attempts, state);

        log.reasoning_trace.push(format!(
            "FAIL: {} ({}) after {} attempt(s): {}",
            stage, failure.kind, attempts, failure.cause
        ));

        warn!(
            stage = %stage,
            kind = %failure.kind,
            attempts,
            defect = failure.is_defect(),
            cause = %failure.cause,
            "Planning run failed"
        );

        let record = log.into_record(PlanningOutcome::Failure {
            stage,
            kind: failure.kind,
            cause: failure.cause.clone(),
            attempts,
        });
        self.store(record).await;

        failure
    }

    async fn store(&self, record: PlanningRecord) {
        if let Err(e) = self.audit_log.record(record).await {
            warn!(error = %e, "Failed to store planning record");
        }
    }
}
