//! Verification engine for finished itineraries
//!
//! Rules-based check run by the builder before an itinerary leaves the
//! pipeline. Deterministic; a failed rule means the builder broke one of its
//! own guarantees.

use crate::config::ScheduleConfig;
use crate::models::{BudgetPlan, DayPace, Itinerary, TripRequest};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// Tolerance for floating point cost sums.
pub const COST_EPSILON: f64 = 1e-6;

/// Inputs the rules check an itinerary against
pub struct VerificationContext<'a> {
    pub request: &'a TripRequest,
    pub budget: &'a BudgetPlan,
    pub schedule: &'a ScheduleConfig,
}

/// Trait for itinerary rules
pub trait ItineraryRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn verify(&self, itinerary: &Itinerary, context: &VerificationContext<'_>) -> RuleOutcome;
}

pub struct RuleOutcome {
    pub passed: bool,
    pub details: String,
}

impl RuleOutcome {
    fn pass(details: impl Into<String>) -> Self {
        Self {
            passed: true,
            details: details.into(),
        }
    }

    fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleCheck {
    pub rule_name: String,
    pub passed: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub verified: bool,
    pub checks: Vec<RuleCheck>,
    pub issues: Vec<String>,
}

/// Verification engine that enforces rules
pub struct VerificationEngine {
    rules: Vec<Box<dyn ItineraryRule>>,
}

impl VerificationEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn ItineraryRule>) {
        self.rules.push(rule);
    }

    pub fn verify(&self, itinerary: &Itinerary, context: &VerificationContext<'_>) -> VerificationReport {
        let mut checks = Vec::with_capacity(self.rules.len());
        let mut issues = Vec::new();

        for rule in &self.rules {
            let outcome = rule.verify(itinerary, context);

            if !outcome.passed {
                warn!(rule = rule.name(), details = %outcome.details, "Itinerary rule failed");
                issues.push(format!("{}: {}", rule.name(), outcome.details));
            }

            checks.push(RuleCheck {
                rule_name: rule.name().to_string(),
                passed: outcome.passed,
                details: outcome.details,
            });
        }

        let verified = issues.is_empty();

        info!(
            rule_count = self.rules.len(),
            verified = verified,
            "Itinerary verification completed"
        );

        VerificationReport {
            verified,
            checks,
            issues,
        }
    }
}

impl Default for VerificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Rules =================
//

/// Rule: one day per date of the trip, in order
pub struct DateCoverageRule;

impl ItineraryRule for DateCoverageRule {
    fn name(&self) -> &'static str {
        "date_coverage"
    }

    fn verify(&self, itinerary: &Itinerary, context: &VerificationContext<'_>) -> RuleOutcome {
        let expected = context.request.dates();
        let actual: Vec<_> = itinerary.days.iter().map(|d| d.date).collect();

        if actual != expected {
            return RuleOutcome::fail(format!(
                "expected {} day(s) from {} to {}, got {}",
                expected.len(),
                context.request.start_date,
                context.request.end_date,
                actual.len()
            ));
        }

        let numbered = itinerary
            .days
            .iter()
            .enumerate()
            .all(|(i, d)| d.day_number as usize == i + 1);
        if !numbered {
            return RuleOutcome::fail("day numbers are not consecutive from 1");
        }

        RuleOutcome::pass(format!("{} day(s) covered", actual.len()))
    }
}

/// Rule: an activity appears in at most one slot
pub struct UniquePlacementRule;

impl ItineraryRule for UniquePlacementRule {
    fn name(&self) -> &'static str {
        "unique_placement"
    }

    fn verify(&self, itinerary: &Itinerary, _context: &VerificationContext<'_>) -> RuleOutcome {
        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = itinerary
            .placed_activity_ids()
            .filter(|id| !seen.insert(*id))
            .collect();

        if duplicates.is_empty() {
            RuleOutcome::pass(format!("{} activities placed once", seen.len()))
        } else {
            RuleOutcome::fail(format!("placed more than once: {}", duplicates.join(", ")))
        }
    }
}

/// Rule: slots sit inside the day window and never overlap
pub struct NoOverlapRule;

impl ItineraryRule for NoOverlapRule {
    fn name(&self) -> &'static str {
        "no_overlap"
    }

    fn verify(&self, itinerary: &Itinerary, context: &VerificationContext<'_>) -> RuleOutcome {
        let window_start = context.schedule.day_start_minute;
        let window_end = context.schedule.day_end_minute;

        for day in &itinerary.days {
            let mut previous_end = window_start;

            for slot in &day.slots {
                let start = minute_of(slot.start);
                let end = minute_of(slot.end);

                if end < start || start < previous_end || end > window_end {
                    return RuleOutcome::fail(format!(
                        "day {}: '{}' at {}-{} overlaps or leaves the day window",
                        day.day_number, slot.name, slot.start, slot.end
                    ));
                }
                previous_end = end;
            }
        }

        RuleOutcome::pass("no overlapping slots")
    }
}

/// Rule: scheduled spend stays within the category ceilings
pub struct BudgetCeilingRule;

impl ItineraryRule for BudgetCeilingRule {
    fn name(&self) -> &'static str {
        "budget_ceilings"
    }

    fn verify(&self, itinerary: &Itinerary, context: &VerificationContext<'_>) -> RuleOutcome {
        let ceilings = &context.budget.ceilings;
        let spent = &itinerary.breakdown;

        let over: Vec<String> = [
            ("accommodation", spent.accommodation, ceilings.accommodation),
            ("activities", spent.activities, ceilings.activities),
            ("meals", spent.meals, ceilings.meals),
            ("transport", spent.transport, ceilings.transport),
            ("total", itinerary.total_cost, context.budget.total_ceiling),
        ]
        .iter()
        .filter(|(_, spent, ceiling)| *spent > *ceiling + COST_EPSILON)
        .map(|(name, spent, ceiling)| format!("{} {:.2} > {:.2}", name, spent, ceiling))
        .collect();

        if over.is_empty() {
            RuleOutcome::pass(format!("scheduled spend {:.2}", itinerary.total_cost))
        } else {
            RuleOutcome::fail(over.join(", "))
        }
    }
}

/// Rule: active minutes respect each day's pace cap
pub struct PaceCapRule;

impl ItineraryRule for PaceCapRule {
    fn name(&self) -> &'static str {
        "pace_cap"
    }

    fn verify(&self, itinerary: &Itinerary, context: &VerificationContext<'_>) -> RuleOutcome {
        let over: Vec<String> = itinerary
            .days
            .iter()
            .filter_map(|day| {
                let cap = match day.pace {
                    DayPace::Relaxed => context.schedule.relaxed_cap_minutes,
                    DayPace::Intense => context.schedule.intense_cap_minutes,
                };
                (day.active_minutes > cap)
                    .then(|| format!("day {} has {} > {} min", day.day_number, day.active_minutes, cap))
            })
            .collect();

        if over.is_empty() {
            RuleOutcome::pass("all days within pace")
        } else {
            RuleOutcome::fail(over.join(", "))
        }
    }
}

fn minute_of(time: chrono::NaiveTime) -> u32 {
    use chrono::Timelike;
    time.hour() * 60 + time.minute()
}

/// Create a default verification engine with standard rules
pub fn create_default_verification_engine() -> VerificationEngine {
    let mut engine = VerificationEngine::new();
    engine.add_rule(Box::new(DateCoverageRule));
    engine.add_rule(Box::new(UniquePlacementRule));
    engine.add_rule(Box::new(NoOverlapRule));
    engine.add_rule(Box::new(BudgetCeilingRule));
    engine.add_rule(Box::new(PaceCapRule));
    engine
}

//
// ================= Tests =================
//
