//! Pipeline stages
//!
//! Each stage reads the already-populated slots of the trip state and returns
//! the artifact for its own slot. Stages declare how the orchestrator should
//! treat their failures; they never retry on their own.

use crate::config::ScheduleConfig;
use crate::gateway::Gateway;
use crate::state::{Artifact, TripState};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

pub mod allocator;
pub mod analyzer;
pub mod builder;
pub mod finder;
pub mod lodging;
pub mod researcher;
pub mod themes;
pub mod travel;

pub use allocator::BudgetAllocator;
pub use analyzer::TripAnalyzer;
pub use builder::ItineraryBuilder;
pub use finder::ActivityFinder;
pub use researcher::DestinationResearcher;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    TripAnalyzer,
    DestinationResearcher,
    ActivityFinder,
    BudgetAllocator,
    ItineraryBuilder,
}

impl StageId {
    /// Canonical pipeline order.
    pub const ORDER: [StageId; 5] = [
        StageId::TripAnalyzer,
        StageId::DestinationResearcher,
        StageId::ActivityFinder,
        StageId::BudgetAllocator,
        StageId::ItineraryBuilder,
    ];

    pub fn predecessors(self) -> &'static [StageId] {
        &Self::ORDER[..self as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            StageId::TripAnalyzer => "Trip Analyzer",
            StageId::DestinationResearcher => "Destination Researcher",
            StageId::ActivityFinder => "Activity Finder",
            StageId::BudgetAllocator => "Budget Allocator",
            StageId::ItineraryBuilder => "Itinerary Builder",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the orchestrator treats a failed attempt of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Retry errors whose kind allows it, within the configured attempt limit.
    Retryable,
    /// Abort after the first failure.
    Fatal,
}

/// A single pipeline stage
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    fn policy(&self) -> FailurePolicy;

    async fn run(&self, state: &TripState, gateway: &Gateway) -> Result<Artifact>;
}

/// The five stages in canonical order.
pub fn default_stages(schedule: &ScheduleConfig) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(TripAnalyzer),
        Box::new(DestinationResearcher),
        Box::new(ActivityFinder::new(schedule)),
        Box::new(BudgetAllocator),
        Box::new(ItineraryBuilder::new(schedule.clone())),
    ]
}

/// Trimmed, lowercased, deduplicated tags from a JSON string array.
pub(crate) fn tag_set(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_predecessors_follow_order() {
        assert!(StageId::TripAnalyzer.predecessors().is_empty());
        assert_eq!(
            StageId::BudgetAllocator.predecessors(),
            &[StageId::TripAnalyzer, StageId::DestinationResearcher, StageId::ActivityFinder]
        );
    }

    #[test]
    fn test_default_stages_are_canonical() {
        let ids: Vec<StageId> = default_stages(&ScheduleConfig::default())
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(ids, StageId::ORDER.to_vec());
    }

    #[test]
    fn test_tag_set_normalizes() {
        let tags = tag_set(Some(&json!([" Food", "food", "", 3, "ART"])));
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["art", "food"]);
    }
}
