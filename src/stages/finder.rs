//! Activity finder: candidate activities scored against the trip profile

use super::{tag_set, FailurePolicy, Stage, StageId};
use crate::config::ScheduleConfig;
use crate::error::PlanningError;
use crate::gateway::{Gateway, ProviderKind};
use crate::models::{Activity, ActivityCategory, ActivitySet, Coordinates, DestinationRecord};
use crate::state::{Artifact, TripState};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

const INTEREST_WEIGHT: f64 = 0.7;
const POPULARITY_WEIGHT: f64 = 0.3;
const DEFAULT_DURATION_MINUTES: u32 = 60;
const DEFAULT_POPULARITY: f64 = 0.5;

pub struct ActivityFinder {
    max_candidates_per_day: usize,
    /// Longest duration a record may claim: the length of the day window.
    max_duration_minutes: u32,
}

impl ActivityFinder {
    pub fn new(schedule: &ScheduleConfig) -> Self {
        Self {
            max_candidates_per_day: schedule.max_candidates_per_day.max(1),
            max_duration_minutes: schedule.day_end_minute.saturating_sub(schedule.day_start_minute),
        }
    }
}

#[async_trait]
impl Stage for ActivityFinder {
    fn id(&self) -> StageId {
        StageId::ActivityFinder
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Retryable
    }

    async fn run(&self, state: &TripState, gateway: &Gateway) -> Result<Artifact> {
        let request = state.request();
        let profile = state.require_profile()?;
        let destination = state.require_destination()?;

        let pairs: Vec<(&DestinationRecord, ActivityCategory)> = destination
            .records
            .iter()
            .flat_map(|record| ActivityCategory::ALL.iter().map(move |c| (record, *c)))
            .collect();

        let queries = pairs.iter().map(|(record, category)| {
            let params = json!({
                "destination": record.name,
                "category": category.as_str(),
                "interests": profile.interests,
                "near": record.center,
            });
            async move { gateway.query(ProviderKind::Places, &params).await }
        });

        let results = join_all(queries).await;

        let mut failed_queries = 0;
        let mut rank = 0u32;
        let mut candidates = Vec::new();

        for ((record, category), result) in pairs.iter().zip(results) {
            let records = match result {
                Ok(result) => result.records,
                Err(e) => {
                    warn!(destination = %record.name, %category, error = %e, "Places query failed");
                    failed_queries += 1;
                    continue;
                }
            };

            debug!(destination = %record.name, %category, count = records.len(), "Places results");

            for raw in &records {
                match parse_candidate(raw, *category, record, rank, self.max_duration_minutes) {
                    Some(activity) if activity.date.is_some_and(|d| !request.covers(d)) => {
                        debug!(activity = %activity.id, date = ?activity.date, "Event outside the trip dates");
                    }
                    Some(activity) => candidates.push(activity),
                    None => warn!(destination = %record.name, %category, "Skipping malformed place record"),
                }
                rank += 1;
            }
        }

        if !pairs.is_empty() && failed_queries == pairs.len() {
            return Err(PlanningError::CapabilityUnavailable(
                "every places query failed".to_string(),
            ));
        }

        let mut activities = ActivitySet::from_ordered(candidates)
            .into_inner()
            .into_iter()
            .map(|mut a| {
                a.fit_score = fit_score(&a.tags, &profile.interests, a.popularity);
                a
            })
            .collect::<Vec<_>>();

        if activities.is_empty() {
            return Err(PlanningError::NoCandidates(format!(
                "no activities found for {}",
                request.destinations.join(", ")
            )));
        }

        activities.sort_by(|a, b| {
            b.fit_score
                .total_cmp(&a.fit_score)
                .then(a.cost.total_cmp(&b.cost))
                .then(a.provider_rank.cmp(&b.provider_rank))
        });

        let cap = self.max_candidates_per_day * request.total_days().max(1);
        let activities = cap_with_category_coverage(activities, cap);

        info!(
            candidates = activities.len(),
            must_see = activities.iter().filter(|a| a.must_see).count(),
            "Activity candidates selected"
        );

        Ok(Artifact::Activities(ActivitySet::from_ordered(activities)))
    }
}

/// Interest overlap blended with the provider's popularity signal, in [0, 1].
pub fn fit_score(tags: &BTreeSet<String>, interests: &BTreeSet<String>, popularity: f64) -> f64 {
    let overlap = if interests.is_empty() {
        0.0
    } else {
        tags.intersection(interests).count() as f64 / interests.len() as f64
    };

    (INTEREST_WEIGHT * overlap + POPULARITY_WEIGHT * popularity.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

/// Keep the first `cap` activities, plus the best of any category the cut would lose.
fn cap_with_category_coverage(sorted: Vec<Activity>, cap: usize) -> Vec<Activity> {
    if sorted.len() <= cap {
        return sorted;
    }

    let mut keep = vec![false; sorted.len()];
    let mut seen = HashSet::new();
    for (i, activity) in sorted.iter().enumerate() {
        if seen.insert(activity.category) {
            keep[i] = true;
        }
    }

    let mut kept = keep.iter().filter(|k| **k).count();
    for slot in keep.iter_mut() {
        if kept >= cap {
            break;
        }
        if !*slot {
            *slot = true;
            kept += 1;
        }
    }

    sorted
        .into_iter()
        .zip(keep)
        .filter_map(|(activity, keep)| keep.then_some(activity))
        .collect()
}

/// Whole minutes in `1..=max`. Absent or zero means the default duration;
/// anything negative, fractional beyond rounding, or longer than the day
/// window makes the record malformed.
fn parse_duration(value: Option<&Value>, max: u32) -> Option<u32> {
    let minutes = match value {
        None | Some(Value::Null) => return Some(DEFAULT_DURATION_MINUTES),
        Some(value) => value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|m| m.is_finite() && *m >= 0.0 && *m <= u32::MAX as f64)
                .map(|m| m.round() as u64)
        })?,
    };

    match u32::try_from(minutes).ok()? {
        0 => Some(DEFAULT_DURATION_MINUTES),
        m if m <= max => Some(m),
        _ => None,
    }
}

fn parse_candidate(
    raw: &Value,
    category: ActivityCategory,
    destination: &DestinationRecord,
    provider_rank: u32,
    max_duration_minutes: u32,
) -> Option<Activity> {
    let id = match raw.get("id")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let name = raw.get("name").and_then(Value::as_str)?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let position = match (
        raw.get("latitude").and_then(Value::as_f64),
        raw.get("longitude").and_then(Value::as_f64),
    ) {
        (Some(latitude), Some(longitude)) => Coordinates { latitude, longitude },
        _ => destination.center?,
    };

    let must_see = raw.get("must_see").and_then(Value::as_bool).unwrap_or(false)
        || raw
            .get("priority")
            .and_then(Value::as_str)
            .map(|p| p.eq_ignore_ascii_case("must-see") || p.eq_ignore_ascii_case("must see"))
            .unwrap_or(false);

    let duration_minutes = parse_duration(raw.get("duration_minutes"), max_duration_minutes)?;

    let date = match raw.get("date") {
        Some(Value::String(s)) if category == ActivityCategory::Event => {
            Some(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()?)
        }
        _ => None,
    };

    Some(Activity {
        id,
        name,
        category,
        duration_minutes,
        cost: raw
            .get("cost")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .max(0.0),
        position,
        popularity: raw
            .get("popularity")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_POPULARITY),
        fit_score: 0.0,
        tags: tag_set(raw.get("tags")),
        must_see,
        provider_rank,
        destination: destination.name.clone(),
        date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::ErrorKind;
    use crate::gateway::mock::{ScriptedReasoning, StaticProvider};
    use crate::models::{DestinationInfo, GroupType, Pace, TravelerComposition, TripProfile, TripRequest};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn state() -> TripState {
        state_for(&["Kyoto"])
    }

    fn state_for(destinations: &[&str]) -> TripState {
        let mut state = TripState::new(TripRequest::new(
            "Oslo",
            destinations.iter().map(|d| d.to_string()).collect(),
            NaiveDate::from_ymd_opt(2027, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2027, 3, 1).unwrap(),
            TravelerComposition { adults: 2, children: 0 },
            2500.0,
        ));
        state
            .apply(Artifact::Profile(TripProfile {
                group_type: GroupType::Couple,
                pace: Pace::Intense,
                interests: BTreeSet::from(["temples".to_string(), "gardens".to_string()]),
                styles: BTreeSet::new(),
            }))
            .unwrap();
        let records = destinations
            .iter()
            .map(|name| {
                let mut record = DestinationRecord::unknown(*name);
                record.center = Some(Coordinates { latitude: 35.0116, longitude: 135.7681 });
                record
            })
            .collect();
        state
            .apply(Artifact::Destination(DestinationInfo { records }))
            .unwrap();
        state
    }

    fn place(id: &str, cost: f64, tags: &[&str], popularity: f64) -> Value {
        json!({
            "id": id, "name": id, "cost": cost, "tags": tags, "popularity": popularity,
            "latitude": 35.0, "longitude": 135.7
        })
    }

    fn gateway(places: StaticProvider) -> Gateway {
        let mut gateway = Gateway::new(
            Arc::new(ScriptedReasoning::new()),
            GatewayConfig {
                call_retries: 0,
                ..GatewayConfig::default()
            },
        );
        gateway.register(Arc::new(places));
        gateway
    }

    async fn find(places: StaticProvider) -> Result<ActivitySet> {
        match ActivityFinder::new(&ScheduleConfig::default()).run(&state(), &gateway(places)).await? {
            Artifact::Activities(set) => Ok(set),
            other => panic!("unexpected artifact {:?}", other.stage()),
        }
    }

    #[test]
    fn test_fit_score_weights() {
        let interests = BTreeSet::from(["a".to_string(), "b".to_string()]);
        let tags = BTreeSet::from(["a".to_string()]);
        let score = fit_score(&tags, &interests, 1.0);
        assert!((score - (0.35 + 0.3)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sorted_by_fit_then_cost_then_provider_order() {
        let places = StaticProvider::new(ProviderKind::Places).with_keyed(
            "category",
            "attraction",
            vec![
                place("pricey", 30.0, &["temples"], 0.5),
                place("cheap", 10.0, &["temples"], 0.5),
                place("first-free", 0.0, &[], 0.5),
                place("second-free", 0.0, &[], 0.5),
                place("best", 50.0, &["temples", "gardens"], 0.9),
            ],
        );

        let set = find(places).await.unwrap();
        let ids: Vec<&str> = set.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "cheap", "pricey", "first-free", "second-free"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first_occurrence() {
        let places = StaticProvider::new(ProviderKind::Places)
            .with_keyed("category", "attraction", vec![place("kinkaku", 5.0, &["temples"], 0.9)])
            .with_keyed("category", "hidden-gem", vec![place("kinkaku", 1.0, &[], 0.1)]);

        let set = find(places).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("kinkaku").unwrap().category, ActivityCategory::Attraction);
    }

    #[tokio::test]
    async fn test_cap_keeps_every_category() {
        let attractions: Vec<Value> = (0..20)
            .map(|i| place(&format!("a{}", i), 1.0, &["temples", "gardens"], 1.0))
            .collect();
        let places = StaticProvider::new(ProviderKind::Places)
            .with_keyed("category", "attraction", attractions)
            .with_keyed("category", "event", vec![place("festival", 5.0, &[], 0.0)]);

        let set = find(places).await.unwrap();
        assert_eq!(set.len(), 8);
        assert!(set.get("festival").is_some());
    }

    #[tokio::test]
    async fn test_no_results_is_no_candidates() {
        let err = find(StaticProvider::new(ProviderKind::Places)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCandidates);
    }

    #[tokio::test]
    async fn test_all_queries_failing_is_transient() {
        let err = find(StaticProvider::new(ProviderKind::Places).failing())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    }

    #[test]
    fn test_missing_position_falls_back_to_centre() {
        let mut record = DestinationRecord::unknown("Kyoto");
        let raw = json!({"id": 7, "name": "Nishiki Market"});
        assert!(parse_candidate(&raw, ActivityCategory::Meal, &record, 0, 840).is_none());

        record.center = Some(Coordinates { latitude: 35.0, longitude: 135.7 });
        let activity = parse_candidate(&raw, ActivityCategory::Meal, &record, 0, 840).unwrap();
        assert_eq!(activity.id, "7");
        assert_eq!(activity.duration_minutes, DEFAULT_DURATION_MINUTES);
    }

    #[tokio::test]
    async fn test_every_destination_and_category_is_queried() {
        let places = Arc::new(
            StaticProvider::new(ProviderKind::Places)
                .with_keyed("destination", "Kyoto", vec![place("fushimi", 0.0, &["temples"], 0.9)])
                .with_keyed("destination", "Nara", vec![place("todaiji", 6.0, &["temples"], 0.8)]),
        );
        let mut gateway = Gateway::new(
            Arc::new(ScriptedReasoning::new()),
            GatewayConfig {
                call_retries: 0,
                ..GatewayConfig::default()
            },
        );
        gateway.register(places.clone());

        let set = match ActivityFinder::new(&ScheduleConfig::default())
            .run(&state_for(&["Kyoto", "Nara"]), &gateway)
            .await
            .unwrap()
        {
            Artifact::Activities(set) => set,
            other => panic!("unexpected artifact {:?}", other.stage()),
        };

        assert_eq!(places.calls(), 8);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("fushimi").unwrap().destination, "Kyoto");
        assert_eq!(set.get("todaiji").unwrap().destination, "Nara");
        assert_eq!(set.get("todaiji").unwrap().category, ActivityCategory::Attraction);
    }

    #[test]
    fn test_durations_beyond_the_day_are_malformed() {
        let record = DestinationRecord::unknown("Kyoto");
        let with_duration = |minutes: Value| {
            let raw = json!({
                "id": "x", "name": "x", "latitude": 35.0, "longitude": 135.7,
                "duration_minutes": minutes
            });
            parse_candidate(&raw, ActivityCategory::Attraction, &record, 0, 840)
        };

        assert!(with_duration(json!(4_294_967_326u64)).is_none());
        assert!(with_duration(json!(u32::MAX)).is_none());
        assert!(with_duration(json!(841)).is_none());
        assert!(with_duration(json!(-5)).is_none());
        assert_eq!(with_duration(json!(840)).unwrap().duration_minutes, 840);
        assert_eq!(with_duration(json!(89.6)).unwrap().duration_minutes, 90);
        assert_eq!(with_duration(json!(0)).unwrap().duration_minutes, DEFAULT_DURATION_MINUTES);
    }

    #[tokio::test]
    async fn test_events_keep_their_date_within_the_trip() {
        let event = |id: &str, date: &str| {
            json!({"id": id, "name": id, "date": date, "latitude": 35.0, "longitude": 135.7})
        };
        let places = StaticProvider::new(ProviderKind::Places).with_keyed(
            "category",
            "event",
            vec![
                event("matsuri", "2027-03-01"),
                event("hanabi", "2027-08-01"),
                event("someday", "soon"),
            ],
        );

        let set = find(places).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("matsuri").unwrap().date, NaiveDate::from_ymd_opt(2027, 3, 1));
    }
}
