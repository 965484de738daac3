//! Error types for the trip planner orchestrator

use crate::state::TripState;
use crate::stages::StageId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for planner operations
pub type Result<T> = std::result::Result<T, PlanningError>;

#[derive(Error, Debug)]
pub enum PlanningError {

    // =============================
    // Transient
    // =============================

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Malformed artifact: {0}")]
    MalformedArtifact(String),

    // =============================
    // Domain infeasibility
    // =============================

    #[error("No candidates: {0}")]
    NoCandidates(String),

    #[error("Infeasible budget: {0}")]
    InfeasibleBudget(String),

    #[error("Unplaceable must-see activity: {0}")]
    UnplaceableMustSee(String),

    #[error("Invalid trip request: {0}")]
    InvalidRequest(String),

    // =============================
    // Control / defects
    // =============================

    #[error("Planning run cancelled")]
    Cancelled,

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Discriminant of a [`PlanningError`], stable enough to report to callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CapabilityUnavailable,
    MalformedArtifact,
    NoCandidates,
    InfeasibleBudget,
    UnplaceableMustSee,
    InvalidRequest,
    Cancelled,
    InvariantViolation,
}

/// How the stage executor may react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Retry up to the stage's attempt limit.
    Transient,
    /// Retry at most once more.
    Once,
    Never,
}

impl PlanningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanningError::CapabilityUnavailable(_) | PlanningError::HttpError(_) => {
                ErrorKind::CapabilityUnavailable
            }
            PlanningError::MalformedArtifact(_) | PlanningError::SerializationError(_) => {
                ErrorKind::MalformedArtifact
            }
            PlanningError::NoCandidates(_) => ErrorKind::NoCandidates,
            PlanningError::InfeasibleBudget(_) => ErrorKind::InfeasibleBudget,
            PlanningError::UnplaceableMustSee(_) => ErrorKind::UnplaceableMustSee,
            PlanningError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PlanningError::Cancelled => ErrorKind::Cancelled,
            PlanningError::InvariantViolation(_) | PlanningError::ConfigError(_) => {
                ErrorKind::InvariantViolation
            }
        }
    }
}

impl ErrorKind {
    pub fn retry(self) -> Retry {
        match self {
            ErrorKind::CapabilityUnavailable | ErrorKind::MalformedArtifact => Retry::Transient,
            ErrorKind::NoCandidates => Retry::Once,
            ErrorKind::InfeasibleBudget
            | ErrorKind::UnplaceableMustSee
            | ErrorKind::InvalidRequest
            | ErrorKind::Cancelled
            | ErrorKind::InvariantViolation => Retry::Never,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::CapabilityUnavailable => "CapabilityUnavailable",
            ErrorKind::MalformedArtifact => "MalformedArtifact",
            ErrorKind::NoCandidates => "NoCandidates",
            ErrorKind::InfeasibleBudget => "InfeasibleBudget",
            ErrorKind::UnplaceableMustSee => "UnplaceableMustSee",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::InvariantViolation => "InvariantViolation",
        };
        write!(f, "{}", s)
    }
}

/// Terminal outcome of a run that produced no itinerary.
#[derive(Error, Debug)]
#[error("{stage} failed with {kind} after {attempts} attempt(s): {cause}")]
pub struct PlanningFailure {
    pub stage: StageId,
    pub kind: ErrorKind,
    pub cause: String,
    pub attempts: u32,
    /// Artifacts produced before the failing stage.
    pub partial_state: Box<TripState>,
}

impl PlanningFailure {
    pub fn new(stage: StageId, error: &PlanningError, attempts: u32, state: TripState) -> Self {
        Self {
            stage,
            kind: error.kind(),
            cause: error.to_string(),
            attempts,
            partial_state: Box::new(state),
        }
    }

    /// True for programming defects, as opposed to domain or transient failures.
    pub fn is_defect(&self) -> bool {
        self.kind == ErrorKind::InvariantViolation
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert_eq!(
            PlanningError::CapabilityUnavailable("down".into()).kind().retry(),
            Retry::Transient
        );
        assert_eq!(PlanningError::NoCandidates("none".into()).kind().retry(), Retry::Once);
        assert_eq!(PlanningError::InfeasibleBudget("x".into()).kind().retry(), Retry::Never);
        assert_eq!(PlanningError::Cancelled.kind().retry(), Retry::Never);
    }

    #[test]
    fn test_serde_error_is_malformed_artifact() {
        let err: PlanningError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::MalformedArtifact);
    }
}
