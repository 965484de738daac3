//! Trip state accumulated across one planning run
//!
//! Each stage owns exactly one slot. Slots are written once, in pipeline
//! order, by the orchestrator; stages only ever see `&TripState`.

use crate::error::PlanningError;
use crate::models::{ActivitySet, BudgetPlan, DestinationInfo, Itinerary, TripProfile, TripRequest};
use crate::stages::StageId;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Output of a single stage, destined for that stage's slot.
#[derive(Debug, Clone)]
pub enum Artifact {
    Profile(TripProfile),
    Destination(DestinationInfo),
    Activities(ActivitySet),
    Budget(BudgetPlan),
    Itinerary(Itinerary),
}

impl Artifact {
    pub fn stage(&self) -> StageId {
        match self {
            Artifact::Profile(_) => StageId::TripAnalyzer,
            Artifact::Destination(_) => StageId::DestinationResearcher,
            Artifact::Activities(_) => StageId::ActivityFinder,
            Artifact::Budget(_) => StageId::BudgetAllocator,
            Artifact::Itinerary(_) => StageId::ItineraryBuilder,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripState {
    request: TripRequest,
    profile: Option<TripProfile>,
    destination: Option<DestinationInfo>,
    activities: Option<ActivitySet>,
    budget: Option<BudgetPlan>,
    itinerary: Option<Itinerary>,
}

fn missing(slot: &str) -> PlanningError {
    PlanningError::InvariantViolation(format!("{} slot read before it was populated", slot))
}

impl TripState {
    pub fn new(request: TripRequest) -> Self {
        Self {
            request,
            profile: None,
            destination: None,
            activities: None,
            budget: None,
            itinerary: None,
        }
    }

    pub fn request(&self) -> &TripRequest {
        &self.request
    }

    pub fn profile(&self) -> Option<&TripProfile> {
        self.profile.as_ref()
    }

    pub fn destination(&self) -> Option<&DestinationInfo> {
        self.destination.as_ref()
    }

    pub fn activities(&self) -> Option<&ActivitySet> {
        self.activities.as_ref()
    }

    pub fn budget(&self) -> Option<&BudgetPlan> {
        self.budget.as_ref()
    }

    pub fn itinerary(&self) -> Option<&Itinerary> {
        self.itinerary.as_ref()
    }

    pub fn require_profile(&self) -> Result<&TripProfile> {
        self.profile.as_ref().ok_or_else(|| missing("profile"))
    }

    pub fn require_destination(&self) -> Result<&DestinationInfo> {
        self.destination.as_ref().ok_or_else(|| missing("destination"))
    }

    pub fn require_activities(&self) -> Result<&ActivitySet> {
        self.activities.as_ref().ok_or_else(|| missing("activities"))
    }

    pub fn require_budget(&self) -> Result<&BudgetPlan> {
        self.budget.as_ref().ok_or_else(|| missing("budget"))
    }

    pub fn is_populated(&self, stage: StageId) -> bool {
        match stage {
            StageId::TripAnalyzer => self.profile.is_some(),
            StageId::DestinationResearcher => self.destination.is_some(),
            StageId::ActivityFinder => self.activities.is_some(),
            StageId::BudgetAllocator => self.budget.is_some(),
            StageId::ItineraryBuilder => self.itinerary.is_some(),
        }
    }

    /// Ok when every predecessor of `stage` has written its slot.
    pub fn ready_for(&self, stage: StageId) -> Result<()> {
        let unmet: Vec<StageId> = stage
            .predecessors()
            .iter()
            .copied()
            .filter(|s| !self.is_populated(*s))
            .collect();

        if unmet.is_empty() {
            Ok(())
        } else {
            Err(PlanningError::InvariantViolation(format!(
                "{} cannot start: unmet predecessors {:?}",
                stage, unmet
            )))
        }
    }

    /// Write an artifact into its stage's slot.
    pub fn apply(&mut self, artifact: Artifact) -> Result<()> {
        let stage = artifact.stage();
        self.ready_for(stage)?;

        if self.is_populated(stage) {
            return Err(PlanningError::InvariantViolation(format!(
                "{} slot written twice",
                stage
            )));
        }

        match artifact {
            Artifact::Profile(p) => self.profile = Some(p),
            Artifact::Destination(d) => self.destination = Some(d),
            Artifact::Activities(a) => self.activities = Some(a),
            Artifact::Budget(b) => self.budget = Some(b),
            Artifact::Itinerary(i) => self.itinerary = Some(i),
        }

        Ok(())
    }

    /// The finished itinerary, or the state back when it has none.
    pub fn into_itinerary(mut self) -> std::result::Result<Itinerary, Self> {
        match self.itinerary.take() {
            Some(itinerary) => Ok(itinerary),
            None => Err(self),
        }
    }
}
