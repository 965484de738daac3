//! Itinerary builder: greedy constrained assignment of activities to days
//!
//! Meals are laid down first as fixed blocks. Every other activity is then
//! walked once in priority order and placed on the earliest day where it fits
//! the time window, the pace cap and the running cost allowance. The result is
//! checked by the verification engine before it is returned.

use super::lodging::{find_lodgings, select_lodging};
use super::themes::{daily_themes, fallback_theme};
use super::travel::{estimate_leg, LegEstimate};
use super::{FailurePolicy, Stage, StageId};
use crate::config::ScheduleConfig;
use crate::error::PlanningError;
use crate::gateway::Gateway;
use crate::models::{
    Activity, ActivityCategory, ActivitySet, BudgetPlan, Coordinates, CostBreakdown, Day, DayPace,
    DestinationInfo, Itinerary, Lodging, MealKind, ScheduledSlot, TravelLeg, TripProfile, TripRequest,
};
use crate::state::{Artifact, TripState};
use crate::verification::{create_default_verification_engine, VerificationContext, COST_EPSILON};
use crate::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

const MAX_HIGHLIGHTS: usize = 3;

pub struct ItineraryBuilder {
    schedule: ScheduleConfig,
}

impl ItineraryBuilder {
    pub fn new(schedule: ScheduleConfig) -> Self {
        Self { schedule }
    }
}

#[async_trait]
impl Stage for ItineraryBuilder {
    fn id(&self) -> StageId {
        StageId::ItineraryBuilder
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Fatal
    }

    async fn run(&self, state: &TripState, gateway: &Gateway) -> Result<Artifact> {
        let request = state.request();
        let destination = state.require_destination()?;
        let activities = state.require_activities()?;

        let (themes, lodgings) = tokio::join!(
            daily_themes(gateway, request, activities),
            find_lodgings(gateway, destination),
        );

        let itinerary = build_itinerary(
            request,
            state.require_profile()?,
            destination,
            activities,
            state.require_budget()?,
            &self.schedule,
            &TripExtras { themes, lodgings },
        )?;

        Ok(Artifact::Itinerary(itinerary))
    }
}

/// Inputs gathered by the builder itself. Neither can fail the run: missing
/// themes fall back to a fixed rotation and no lodgings means none is chosen.
#[derive(Debug, Clone, Default)]
pub struct TripExtras {
    pub themes: Vec<String>,
    pub lodgings: Vec<Lodging>,
}

/// Activity with its budget verdict attached.
#[derive(Clone, Copy)]
struct Ranked<'a> {
    activity: &'a Activity,
    priority: f64,
    affordable: bool,
}

/// Where an activity lands inside a day. Minutes after midnight.
#[derive(Clone, Copy)]
struct Fit {
    leg: LegEstimate,
    departs: u32,
    start: u32,
    end: u32,
}

struct Placement<'a> {
    ranked: Ranked<'a>,
    from_activity_id: Option<&'a str>,
    fit: Fit,
}

struct DayDraft<'a> {
    date: NaiveDate,
    pace: DayPace,
    cap: u32,
    meal_blocks: Vec<(u32, u32)>,
    meals: Vec<ScheduledSlot>,
    placements: Vec<Placement<'a>>,
    cursor: u32,
    position: Option<Coordinates>,
    active_minutes: u32,
}

impl<'a> DayDraft<'a> {
    fn last_activity_id(&self) -> Option<&'a str> {
        self.placements.last().map(|p| p.ranked.activity.id.as_str())
    }

    /// Earliest fit after the cursor that stays in the window, clears every
    /// meal block and keeps the day within its pace cap. Dated events only fit
    /// on their own date.
    fn find_fit(&self, activity: &Activity, day_end: u32) -> Option<Fit> {
        if activity.date.is_some_and(|date| date != self.date) {
            return None;
        }

        let leg = estimate_leg(self.position, activity.position);
        let span = leg.duration_minutes.checked_add(activity.duration_minutes)?;

        if self.active_minutes.checked_add(span)? > self.cap {
            return None;
        }

        let mut departs = self.cursor;
        loop {
            let end = departs.checked_add(span)?;
            if end > day_end {
                return None;
            }
            match self
                .meal_blocks
                .iter()
                .find(|(block_start, block_end)| *block_start < end && *block_end > departs)
            {
                Some(&(_, block_end)) => departs = block_end,
                None => {
                    return Some(Fit {
                        leg,
                        departs,
                        start: departs + leg.duration_minutes,
                        end,
                    })
                }
            }
        }
    }

    fn place(&mut self, ranked: Ranked<'a>, fit: Fit) {
        let from_activity_id = self.last_activity_id();
        self.cursor = fit.end;
        self.position = Some(ranked.activity.position);
        self.active_minutes += fit.leg.duration_minutes + ranked.activity.duration_minutes;
        self.placements.push(Placement {
            ranked,
            from_activity_id,
            fit,
        });
    }
}

/// Per-day activity spend with carry-over of unspent allowance.
struct SpendLedger {
    ceiling: f64,
    spent: Vec<f64>,
}

impl SpendLedger {
    fn new(ceiling: f64, days: usize) -> Self {
        Self {
            ceiling,
            spent: vec![0.0; days],
        }
    }

    /// Adding `cost` on `day` keeps every prefix from `day` on within its
    /// cumulative allowance.
    fn allows(&self, day: usize, cost: f64) -> bool {
        let days = self.spent.len() as f64;
        let mut prefix = 0.0;
        for (k, spent) in self.spent.iter().enumerate() {
            prefix += spent;
            if k >= day && prefix + cost > self.ceiling * (k + 1) as f64 / days + COST_EPSILON {
                return false;
            }
        }
        true
    }

    fn trip_allows(&self, cost: f64) -> bool {
        self.total() + cost <= self.ceiling + COST_EPSILON
    }

    fn record(&mut self, day: usize, cost: f64) {
        self.spent[day] += cost;
    }

    fn total(&self) -> f64 {
        self.spent.iter().sum()
    }
}

fn by_priority(a: &Ranked<'_>, b: &Ranked<'_>) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then(a.activity.cost.total_cmp(&b.activity.cost))
        .then(a.activity.provider_rank.cmp(&b.activity.provider_rank))
}

fn clock(minute: u32) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).ok_or_else(|| {
        PlanningError::InvariantViolation(format!("minute {} is outside the day", minute))
    })
}

pub fn build_itinerary(
    request: &TripRequest,
    profile: &TripProfile,
    destination: &DestinationInfo,
    activities: &ActivitySet,
    budget: &BudgetPlan,
    schedule: &ScheduleConfig,
    extras: &TripExtras,
) -> Result<Itinerary> {
    let dates = request.dates();
    if dates.is_empty() {
        return Err(PlanningError::InvariantViolation(
            "trip has no dates to schedule".to_string(),
        ));
    }

    let mut ranked = activities
        .iter()
        .map(|activity| {
            budget
                .allocation(&activity.id)
                .map(|allocation| Ranked {
                    activity,
                    priority: allocation.priority,
                    affordable: allocation.affordable,
                })
                .ok_or_else(|| {
                    PlanningError::InvariantViolation(format!(
                        "activity '{}' has no budget allocation",
                        activity.id
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    ranked.sort_by(by_priority);

    let (mut meal_candidates, attractions): (Vec<Ranked>, Vec<Ranked>) = ranked
        .into_iter()
        .partition(|r| r.activity.category == ActivityCategory::Meal);
    meal_candidates.sort_by(|a, b| b.activity.must_see.cmp(&a.activity.must_see).then(by_priority(a, b)));

    let centre = destination.primary_center();
    let mut drafts = dates
        .iter()
        .enumerate()
        .map(|(index, date)| {
            let pace = profile.pace.for_day(index);
            DayDraft {
                date: *date,
                pace,
                cap: match pace {
                    DayPace::Relaxed => schedule.relaxed_cap_minutes,
                    DayPace::Intense => schedule.intense_cap_minutes,
                },
                meal_blocks: Vec::new(),
                meals: Vec::new(),
                placements: Vec::new(),
                cursor: schedule.day_start_minute,
                position: centre,
                active_minutes: 0,
            }
        })
        .collect::<Vec<_>>();

    let meal_spend = schedule_meals(&mut drafts, &meal_candidates, budget, schedule)?;

    let mut ledger = SpendLedger::new(budget.ceilings.activities, drafts.len());
    let mut transport_spent = 0.0;
    let mut dropped = Vec::new();

    for candidate in attractions {
        let activity = candidate.activity;

        if !candidate.affordable && !activity.must_see {
            debug!(activity = %activity.id, cost = activity.cost, "Unaffordable, dropped");
            dropped.push(activity.id.clone());
            continue;
        }

        let transport_ok = |fit: &Fit| {
            transport_spent + fit.leg.cost <= budget.ceilings.transport + COST_EPSILON
        };

        let mut choice = drafts.iter().enumerate().find_map(|(day, draft)| {
            draft
                .find_fit(activity, schedule.day_end_minute)
                .filter(|fit| ledger.allows(day, activity.cost) && transport_ok(fit))
                .map(|fit| (day, fit))
        });

        if choice.is_none() && activity.must_see {
            choice = drafts.iter().enumerate().find_map(|(day, draft)| {
                draft
                    .find_fit(activity, schedule.day_end_minute)
                    .filter(|fit| ledger.trip_allows(activity.cost) && transport_ok(fit))
                    .map(|fit| (day, fit))
            });
            if choice.is_some() {
                debug!(activity = %activity.id, "Must-see placed past the daily allowance");
            }
        }

        match choice {
            Some((day, fit)) => {
                debug!(
                    activity = %activity.id,
                    day = day + 1,
                    start = fit.start,
                    mode = ?fit.leg.mode,
                    "Activity placed"
                );
                ledger.record(day, activity.cost);
                transport_spent += fit.leg.cost;
                drafts[day].place(candidate, fit);
            }
            None if activity.must_see => {
                return Err(PlanningError::UnplaceableMustSee(format!(
                    "'{}' fits on no day of the trip",
                    activity.name
                )));
            }
            None => {
                debug!(activity = %activity.id, "No day fits, dropped");
                dropped.push(activity.id.clone());
            }
        }
    }

    if extras.themes.len() != drafts.len() {
        warn!(
            themes = extras.themes.len(),
            days = drafts.len(),
            "Theme count does not match the trip, filling from the fallback rotation"
        );
    }

    let days = drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| {
            let theme = extras
                .themes
                .get(index)
                .cloned()
                .unwrap_or_else(|| fallback_theme(index));
            finish_day(index, draft, theme, destination)
        })
        .collect::<Result<Vec<_>>>()?;

    let lodging = select_lodging(&extras.lodgings, budget.ceilings.accommodation, request.total_nights());

    let breakdown = CostBreakdown {
        accommodation: lodging
            .as_ref()
            .map_or(budget.ceilings.accommodation, |choice| choice.total_cost),
        transport: transport_spent,
        activities: ledger.total(),
        meals: meal_spend,
    };

    let itinerary = Itinerary {
        trip_id: request.request_id,
        destinations: request.destinations.clone(),
        start_date: request.start_date,
        end_date: request.end_date,
        days,
        total_cost: breakdown.transport + breakdown.activities + breakdown.meals,
        breakdown,
        lodging,
        dropped,
    };

    let context = VerificationContext {
        request,
        budget,
        schedule,
    };
    let report = create_default_verification_engine().verify(&itinerary, &context);
    if !report.verified {
        return Err(PlanningError::InvariantViolation(report.issues.join("; ")));
    }

    info!(
        days = itinerary.days.len(),
        placed = itinerary.placed_activity_ids().count(),
        dropped = itinerary.dropped.len(),
        total_cost = itinerary.total_cost,
        "Itinerary built"
    );

    Ok(itinerary)
}

/// One fixed meal block and the candidate it currently holds.
struct MealSeat {
    day: usize,
    kind: MealKind,
    label: &'static str,
    start: u32,
    end: u32,
    venue: Option<usize>,
}

/// Lays the three meal blocks onto every day and returns the meal spend.
///
/// Seats are filled with venues within the per-meal allowance, must-sees
/// first. A must-see venue left over then takes the first seat not held by
/// another must-see whose swap keeps the trip within the meals ceiling.
fn schedule_meals(
    drafts: &mut [DayDraft<'_>],
    candidates: &[Ranked<'_>],
    budget: &BudgetPlan,
    schedule: &ScheduleConfig,
) -> Result<f64> {
    let meals = [
        (MealKind::Breakfast, "Breakfast", schedule.breakfast),
        (MealKind::Lunch, "Lunch", schedule.lunch),
        (MealKind::Dinner, "Dinner", schedule.dinner),
    ];
    let allowance = budget.ceilings.meals / (drafts.len() * meals.len()) as f64;

    let mut used = vec![false; candidates.len()];
    let mut seats = Vec::with_capacity(drafts.len() * meals.len());

    for day in 0..drafts.len() {
        for (kind, label, (start, duration)) in meals {
            let venue = candidates
                .iter()
                .enumerate()
                .find(|(i, c)| !used[*i] && c.activity.cost <= allowance + COST_EPSILON)
                .map(|(i, _)| i);
            if let Some(i) = venue {
                used[i] = true;
            }
            seats.push(MealSeat {
                day,
                kind,
                label,
                start,
                end: start + duration,
                venue,
            });
        }
    }

    let seat_cost = |seat: &MealSeat| seat.venue.map_or(allowance, |i| candidates[i].activity.cost);
    let holds_must_see = |seat: &MealSeat| seat.venue.is_some_and(|i| candidates[i].activity.must_see);

    for (i, candidate) in candidates.iter().enumerate() {
        if used[i] || !candidate.activity.must_see {
            continue;
        }

        let spend: f64 = seats.iter().map(seat_cost).sum();
        let seat = seats.iter().position(|seat| {
            !holds_must_see(seat)
                && spend - seat_cost(seat) + candidate.activity.cost <= budget.ceilings.meals + COST_EPSILON
        });

        match seat {
            Some(s) => {
                if let Some(previous) = seats[s].venue {
                    used[previous] = false;
                }
                seats[s].venue = Some(i);
                used[i] = true;
                debug!(
                    activity = %candidate.activity.id,
                    day = seats[s].day + 1,
                    meal = ?seats[s].kind,
                    "Must-see meal placed past the per-meal allowance"
                );
            }
            None => {
                return Err(PlanningError::UnplaceableMustSee(format!(
                    "meal '{}' fits no meal slot within the meals budget",
                    candidate.activity.name
                )));
            }
        }
    }

    let mut spend = 0.0;
    for seat in &seats {
        let slot = match seat.venue {
            Some(i) => {
                let activity = candidates[i].activity;
                ScheduledSlot {
                    activity_id: Some(activity.id.clone()),
                    name: activity.name.clone(),
                    category: ActivityCategory::Meal,
                    meal: Some(seat.kind),
                    start: clock(seat.start)?,
                    end: clock(seat.end)?,
                    cost: activity.cost,
                    must_see: activity.must_see,
                }
            }
            None => ScheduledSlot {
                activity_id: None,
                name: seat.label.to_string(),
                category: ActivityCategory::Meal,
                meal: Some(seat.kind),
                start: clock(seat.start)?,
                end: clock(seat.end)?,
                cost: allowance,
                must_see: false,
            },
        };

        spend += slot.cost;
        let draft = &mut drafts[seat.day];
        draft.meal_blocks.push((seat.start, seat.end));
        draft.meals.push(slot);
    }

    Ok(spend)
}

fn finish_day(index: usize, draft: DayDraft<'_>, theme: String, destination: &DestinationInfo) -> Result<Day> {
    let mut slots = draft.meals;
    let mut legs = Vec::with_capacity(draft.placements.len());

    for placement in &draft.placements {
        let activity = placement.ranked.activity;
        slots.push(ScheduledSlot {
            activity_id: Some(activity.id.clone()),
            name: activity.name.clone(),
            category: activity.category,
            meal: None,
            start: clock(placement.fit.start)?,
            end: clock(placement.fit.end)?,
            cost: activity.cost,
            must_see: activity.must_see,
        });
        legs.push(TravelLeg {
            from_activity_id: placement.from_activity_id.map(str::to_string),
            to_activity_id: activity.id.clone(),
            mode: placement.fit.leg.mode,
            distance_km: placement.fit.leg.distance_km,
            duration_minutes: placement.fit.leg.duration_minutes,
            cost: placement.fit.leg.cost,
            departs: clock(placement.fit.departs)?,
        });
    }
    slots.sort_by_key(|s| s.start);

    let mut ranked: Vec<&Placement> = draft.placements.iter().collect();
    ranked.sort_by(|a, b| by_priority(&a.ranked, &b.ranked));
    let highlights = ranked
        .iter()
        .take(MAX_HIGHLIGHTS)
        .map(|p| p.ranked.activity.name.clone())
        .collect();

    let total_cost = slots.iter().map(|s| s.cost).sum::<f64>() + legs.iter().map(|l| l.cost).sum::<f64>();

    Ok(Day {
        day_number: index as u32 + 1,
        date: draft.date,
        theme,
        pace: draft.pace,
        slots,
        legs,
        active_minutes: draft.active_minutes,
        intensity: draft.active_minutes as f64 / draft.cap.max(1) as f64,
        total_cost,
        weather: destination.weather_on(draft.date).cloned(),
        highlights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{
        ActivityBudget, CategoryCeilings, GroupType, Pace, TravelerComposition,
    };
    use std::collections::BTreeSet;

    const HERE: Coordinates = Coordinates { latitude: 38.7139, longitude: -9.1334 };

    fn request(days: u32) -> TripRequest {
        TripRequest::new(
            "London",
            vec!["Lisbon".to_string()],
            NaiveDate::from_ymd_opt(2027, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2027, 10, days).unwrap(),
            TravelerComposition { adults: 1, children: 0 },
            2000.0,
        )
    }

    fn profile(pace: Pace) -> TripProfile {
        TripProfile {
            group_type: GroupType::Solo,
            pace,
            interests: BTreeSet::from(["history".to_string()]),
            styles: BTreeSet::new(),
        }
    }

    fn destination() -> DestinationInfo {
        let mut record = crate::models::DestinationRecord::unknown("Lisbon");
        record.center = Some(HERE);
        DestinationInfo { records: vec![record] }
    }

    fn activity(id: &str, cost: f64, minutes: u32, fit: f64, must_see: bool) -> Activity {
        Activity {
            id: id.to_string(),
            name: id.to_string(),
            category: ActivityCategory::Attraction,
            duration_minutes: minutes,
            cost,
            position: HERE,
            popularity: 0.5,
            fit_score: fit,
            tags: BTreeSet::new(),
            must_see,
            provider_rank: 0,
            destination: "Lisbon".to_string(),
            date: None,
        }
    }

    fn meal(id: &str, cost: f64, fit: f64) -> Activity {
        Activity {
            category: ActivityCategory::Meal,
            ..activity(id, cost, 60, fit, false)
        }
    }

    fn must_see_meal(id: &str, cost: f64) -> Activity {
        Activity {
            must_see: true,
            ..meal(id, cost, 0.5)
        }
    }

    fn budget(activities: &[Activity], activities_ceiling: f64, meals_ceiling: f64) -> BudgetPlan {
        BudgetPlan {
            total_ceiling: 2000.0,
            must_see_total: activities.iter().filter(|a| a.must_see).map(|a| a.cost).sum(),
            ceilings: CategoryCeilings {
                accommodation: 500.0,
                transport: 100.0,
                activities: activities_ceiling,
                meals: meals_ceiling,
            },
            allocations: activities
                .iter()
                .map(|a| ActivityBudget {
                    activity_id: a.id.clone(),
                    affordable: a.cost <= activities_ceiling,
                    priority: a.fit_score + if a.must_see { 10.0 } else { 0.0 },
                })
                .collect(),
        }
    }

    fn build(days: u32, pace: Pace, activities: Vec<Activity>, ceiling: f64) -> Result<Itinerary> {
        build_with(days, pace, activities, ceiling, 300.0, &TripExtras::default())
    }

    fn build_with(
        days: u32,
        pace: Pace,
        activities: Vec<Activity>,
        ceiling: f64,
        meals_ceiling: f64,
        extras: &TripExtras,
    ) -> Result<Itinerary> {
        let plan = budget(&activities, ceiling, meals_ceiling);
        build_itinerary(
            &request(days),
            &profile(pace),
            &destination(),
            &ActivitySet::from_ordered(activities),
            &plan,
            &ScheduleConfig::default(),
            extras,
        )
    }

    fn meal_names(day: &Day) -> Vec<(&str, f64)> {
        day.slots
            .iter()
            .filter(|s| s.meal.is_some())
            .map(|s| (s.name.as_str(), s.cost))
            .collect()
    }

    fn non_meal_count(itinerary: &Itinerary) -> usize {
        itinerary
            .days
            .iter()
            .flat_map(|d| d.slots.iter())
            .filter(|s| s.meal.is_none())
            .count()
    }

    #[test]
    fn test_three_day_relaxed_trip_within_caps() {
        let activities = vec![
            activity("a", 50.0, 120, 0.9, false),
            activity("b", 80.0, 120, 0.8, false),
            activity("c", 40.0, 120, 0.7, false),
            activity("d", 120.0, 120, 0.6, false),
            activity("e", 30.0, 120, 0.5, false),
        ];
        let itinerary = build(3, Pace::Relaxed, activities, 300.0).unwrap();

        assert_eq!(itinerary.days.len(), 3);
        assert!(itinerary.breakdown.activities <= 300.0);
        for day in &itinerary.days {
            assert!(day.active_minutes <= 360);
            assert!(day.intensity <= 1.0);
            assert_eq!(day.slots.iter().filter(|s| s.meal.is_some()).count(), 3);
        }
        assert_eq!(non_meal_count(&itinerary), 4);
        assert_eq!(itinerary.dropped, vec!["e".to_string()]);
    }

    #[test]
    fn test_daily_allowance_carries_over() {
        let activities = vec![
            activity("big", 150.0, 60, 0.9, false),
            activity("small", 20.0, 60, 0.1, false),
        ];
        let itinerary = build(2, Pace::Intense, activities, 200.0).unwrap();

        let day_of = |id: &str| {
            itinerary
                .days
                .iter()
                .find(|d| d.slots.iter().any(|s| s.activity_id.as_deref() == Some(id)))
                .map(|d| d.day_number)
        };
        assert_eq!(day_of("big"), Some(2));
        assert_eq!(day_of("small"), Some(1));
    }

    #[test]
    fn test_same_inputs_same_days() {
        let activities: Vec<Activity> = (0..8)
            .map(|i| activity(&format!("a{}", i), 10.0 + i as f64 * 7.0, 90, 0.9 - i as f64 * 0.05, false))
            .collect();

        let first = build(3, Pace::Mixed, activities.clone(), 250.0).unwrap();
        let second = build(3, Pace::Mixed, activities, 250.0).unwrap();
        assert_eq!(first.days, second.days);
        assert_eq!(first.dropped, second.dropped);
    }

    #[test]
    fn test_raising_ceiling_never_places_fewer() {
        let activities: Vec<Activity> = (0..10)
            .map(|i| activity(&format!("a{}", i), 25.0, 30, 1.0 - i as f64 * 0.05, false))
            .collect();

        let placed: Vec<usize> = [50.0, 100.0, 150.0, 200.0, 250.0, 300.0]
            .iter()
            .map(|ceiling| non_meal_count(&build(2, Pace::Intense, activities.clone(), *ceiling).unwrap()))
            .collect();

        assert!(placed.windows(2).all(|w| w[0] <= w[1]), "{:?}", placed);
        assert_eq!(placed.first(), Some(&2));
        assert_eq!(placed.last(), Some(&10));
    }

    #[test]
    fn test_unfittable_optional_activity_is_dropped() {
        let activities = vec![
            activity("marathon", 10.0, 900, 0.9, false),
            activity("walk", 10.0, 60, 0.5, false),
        ];
        let itinerary = build(1, Pace::Intense, activities, 100.0).unwrap();
        assert_eq!(itinerary.dropped, vec!["marathon".to_string()]);
        assert_eq!(non_meal_count(&itinerary), 1);
    }

    #[test]
    fn test_unfittable_must_see_fails() {
        let activities = vec![activity("marathon", 10.0, 900, 0.9, true)];
        let err = build(2, Pace::Intense, activities, 100.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnplaceableMustSee);
    }

    #[test]
    fn test_must_see_placed_past_daily_allowance() {
        let activities = vec![
            activity("tower", 10.0, 100, 0.9, true),
            activity("museum", 0.0, 300, 0.8, true),
            activity("palace", 90.0, 200, 0.1, true),
        ];
        let itinerary = build(2, Pace::Relaxed, activities, 100.0).unwrap();

        let first_day: Vec<&str> = itinerary.days[0]
            .slots
            .iter()
            .filter_map(|s| s.activity_id.as_deref())
            .collect();
        assert_eq!(first_day, vec!["tower", "palace"]);
        assert!((itinerary.breakdown.activities - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_slots_never_overlap() {
        let activities: Vec<Activity> = (0..12)
            .map(|i| activity(&format!("a{}", i), 5.0, 45 + i * 10, 0.5, false))
            .collect();
        let itinerary = build(2, Pace::Intense, activities, 500.0).unwrap();

        for day in &itinerary.days {
            for pair in day.slots.windows(2) {
                assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0].name, pair[1].name);
            }
        }
    }

    #[test]
    fn test_meals_use_affordable_venues_then_generic() {
        let activities = vec![
            meal("steakhouse", 45.0, 0.9),
            meal("cafe", 8.0, 0.6),
            meal("bistro", 15.0, 0.3),
        ];
        let itinerary = build_with(1, Pace::Relaxed, activities, 100.0, 60.0, &TripExtras::default()).unwrap();

        assert_eq!(
            meal_names(&itinerary.days[0]),
            vec![("cafe", 8.0), ("bistro", 15.0), ("Dinner", 20.0)]
        );
        assert!((itinerary.breakdown.meals - 43.0).abs() < 1e-9);
        assert!(itinerary.dropped.is_empty());
    }

    #[test]
    fn test_must_see_meal_over_allowance_takes_a_seat() {
        let activities = vec![
            must_see_meal("feast", 45.0),
            meal("cafe", 5.0, 0.6),
            meal("deli", 5.0, 0.3),
        ];
        let itinerary = build_with(1, Pace::Relaxed, activities, 100.0, 60.0, &TripExtras::default()).unwrap();

        assert_eq!(
            meal_names(&itinerary.days[0]),
            vec![("cafe", 5.0), ("deli", 5.0), ("feast", 45.0)]
        );
        assert!((itinerary.breakdown.meals - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_must_see_meal_over_meals_ceiling_fails() {
        let err = build_with(
            1,
            Pace::Relaxed,
            vec![must_see_meal("feast", 45.0)],
            100.0,
            60.0,
            &TripExtras::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnplaceableMustSee);
    }

    #[test]
    fn test_more_must_see_meals_than_seats_fails() {
        let activities = (0..4).map(|i| must_see_meal(&format!("m{}", i), 10.0)).collect();
        let err = build_with(1, Pace::Relaxed, activities, 100.0, 60.0, &TripExtras::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnplaceableMustSee);
    }

    #[test]
    fn test_huge_duration_never_fits() {
        let activities = vec![
            activity("huge", 10.0, u32::MAX, 0.9, false),
            activity("walk", 10.0, 60, 0.5, false),
        ];
        let itinerary = build(1, Pace::Intense, activities, 100.0).unwrap();
        assert_eq!(itinerary.dropped, vec!["huge".to_string()]);
        assert_eq!(non_meal_count(&itinerary), 1);

        let err = build(1, Pace::Intense, vec![activity("huge", 10.0, u32::MAX, 0.9, true)], 100.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnplaceableMustSee);
    }

    #[test]
    fn test_dated_event_only_on_its_date() {
        let on_day = |id: &str, day: u32| Activity {
            category: ActivityCategory::Event,
            date: NaiveDate::from_ymd_opt(2027, 10, day),
            ..activity(id, 10.0, 60, 0.99, false)
        };
        let activities = vec![
            on_day("fado", 3),
            on_day("concert", 20),
            activity("museum", 10.0, 60, 0.5, false),
        ];
        let itinerary = build(3, Pace::Intense, activities, 300.0).unwrap();

        let day_of = |id: &str| {
            itinerary
                .days
                .iter()
                .find(|d| d.slots.iter().any(|s| s.activity_id.as_deref() == Some(id)))
                .map(|d| d.day_number)
        };
        assert_eq!(day_of("fado"), Some(3));
        assert_eq!(day_of("museum"), Some(1));
        assert_eq!(itinerary.dropped, vec!["concert".to_string()]);
    }

    #[test]
    fn test_themes_fill_days_and_lodging_sets_accommodation() {
        let extras = TripExtras {
            themes: vec!["Alfama".to_string()],
            lodgings: vec![
                Lodging {
                    id: "palacio".to_string(),
                    name: "Palácio".to_string(),
                    nightly_rate: 900.0,
                    rating: 1.0,
                    position: None,
                },
                Lodging {
                    id: "pensao".to_string(),
                    name: "Pensão".to_string(),
                    nightly_rate: 70.0,
                    rating: 0.6,
                    position: None,
                },
            ],
        };
        let itinerary = build_with(
            2,
            Pace::Relaxed,
            vec![activity("tram", 3.0, 60, 0.5, false)],
            100.0,
            300.0,
            &extras,
        )
        .unwrap();

        let themes: Vec<&str> = itinerary.days.iter().map(|d| d.theme.as_str()).collect();
        assert_eq!(themes, vec!["Alfama", "Museums & Culture"]);

        let lodging = itinerary.lodging.as_ref().unwrap();
        assert_eq!(lodging.lodging.id, "pensao");
        assert_eq!(lodging.nights, 1);
        assert!((itinerary.breakdown.accommodation - 70.0).abs() < 1e-9);
    }
}
