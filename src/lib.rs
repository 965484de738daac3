//! Trip Planner Orchestrator
//!
//! Turns a trip request into a day-by-day itinerary:
//! - Classifies the traveler group, pace and interests with an LLM
//! - Researches weather, costs and local context per destination
//! - Finds and scores candidate activities from a places provider
//! - Splits the budget and prioritizes activities deterministically
//! - Greedily schedules activities into days under time, pace and cost limits
//! - Records every run in an auditable log
//!
//! PIPELINE:
//! INPUT → ANALYZE → RESEARCH → FIND → ALLOCATE → BUILD → COMPLETE

pub mod agent;
pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod models;
pub mod stages;
pub mod state;
pub mod verification;

pub use error::{PlanningError, PlanningFailure, Result};

// Re-export common types
pub use agent::Orchestrator;
pub use models::*;
