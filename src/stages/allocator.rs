//! Budget allocator: category ceilings and per-activity priorities
//!
//! Deterministic; a failure here is caused by the inputs, so the stage is fatal.

use super::{FailurePolicy, Stage, StageId};
use crate::error::PlanningError;
use crate::gateway::Gateway;
use crate::models::{ActivityBudget, ActivitySet, BudgetPlan, CategoryCeilings, GroupType};
use crate::state::{Artifact, TripState};
use crate::Result;
use async_trait::async_trait;
use tracing::info;

const MIN_SHARE: f64 = 0.05;
const MAX_COST_SHIFT: f64 = 0.10;
const COST_SHIFT_PER_INDEX: f64 = 0.10;
const MUST_SEE_BONUS: f64 = 10.0;

pub struct BudgetAllocator;

#[async_trait]
impl Stage for BudgetAllocator {
    fn id(&self) -> StageId {
        StageId::BudgetAllocator
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Fatal
    }

    async fn run(&self, state: &TripState, _gateway: &Gateway) -> Result<Artifact> {
        let request = state.request();
        let profile = state.require_profile()?;
        let destination = state.require_destination()?;
        let activities = state.require_activities()?;

        let plan = allocate(
            request.budget,
            profile.group_type,
            destination.cost_index(),
            activities,
        )?;

        info!(
            ceiling = plan.total_ceiling,
            activities = plan.ceilings.activities,
            meals = plan.ceilings.meals,
            affordable = plan.allocations.iter().filter(|a| a.affordable).count(),
            "Budget allocated"
        );

        Ok(Artifact::Budget(plan))
    }
}

/// Shares as (accommodation, transport, activities, meals).
fn base_shares(group: GroupType) -> [f64; 4] {
    match group {
        GroupType::Solo => [0.35, 0.15, 0.30, 0.20],
        GroupType::Couple => [0.40, 0.10, 0.25, 0.25],
        GroupType::Family => [0.40, 0.15, 0.20, 0.25],
        GroupType::Group => [0.35, 0.15, 0.25, 0.25],
    }
}

/// Pricier destinations move share from activities and transport to lodging and food.
fn shifted_shares(group: GroupType, cost_index: f64) -> [f64; 4] {
    let [acc, transport, act, meals] = base_shares(group);
    let shift = ((cost_index - 1.0) * COST_SHIFT_PER_INDEX).clamp(-MAX_COST_SHIFT, MAX_COST_SHIFT);

    let shares = [
        (acc + shift / 2.0).max(MIN_SHARE),
        (transport - shift / 2.0).max(MIN_SHARE),
        (act - shift / 2.0).max(MIN_SHARE),
        (meals + shift / 2.0).max(MIN_SHARE),
    ];

    let sum: f64 = shares.iter().sum();
    shares.map(|s| s / sum)
}

pub fn allocate(
    ceiling: f64,
    group: GroupType,
    cost_index: f64,
    activities: &ActivitySet,
) -> Result<BudgetPlan> {
    let must_see_total = activities.must_see_total();
    if must_see_total > ceiling {
        return Err(PlanningError::InfeasibleBudget(format!(
            "must-see activities cost {:.2} but the whole budget is {:.2}",
            must_see_total, ceiling
        )));
    }

    let [acc, transport, act, meals] = shifted_shares(group, cost_index);
    let mut ceilings = CategoryCeilings {
        accommodation: ceiling * acc,
        transport: ceiling * transport,
        activities: ceiling * act,
        meals: ceiling * meals,
    };

    if ceilings.activities < must_see_total {
        let others = ceiling - ceilings.activities;
        let scale = if others > 0.0 {
            (ceiling - must_see_total) / others
        } else {
            0.0
        };
        ceilings = CategoryCeilings {
            accommodation: ceilings.accommodation * scale,
            transport: ceilings.transport * scale,
            activities: must_see_total,
            meals: ceilings.meals * scale,
        };
    }

    let allocations = activities
        .iter()
        .map(|a| {
            let headroom = if ceilings.activities > 0.0 {
                (1.0 - a.cost / ceilings.activities).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let bonus = if a.must_see { MUST_SEE_BONUS } else { 0.0 };

            ActivityBudget {
                activity_id: a.id.clone(),
                affordable: a.cost <= ceilings.activities,
                priority: a.fit_score * (0.5 + 0.5 * headroom) + bonus,
            }
        })
        .collect();

    Ok(BudgetPlan {
        total_ceiling: ceiling,
        must_see_total,
        ceilings,
        allocations,
    })
}
