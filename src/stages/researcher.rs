//! Destination researcher: weather, cost and narrative notes per destination
//!
//! Provider gaps are never errors here. A missing weather day or cost index
//! stays `None` and downstream stages treat it as unknown.

use super::{FailurePolicy, Stage, StageId};
use crate::gateway::{Gateway, ProviderError, ProviderKind, ProviderResult, TaskKind};
use crate::models::{Coordinates, DailyWeather, DestinationInfo, DestinationRecord, TripProfile};
use crate::state::{Artifact, TripState};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::{join_all, try_join_all};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const MAX_SEARCH_SNIPPETS: usize = 5;

pub struct DestinationResearcher;

#[async_trait]
impl Stage for DestinationResearcher {
    fn id(&self) -> StageId {
        StageId::DestinationResearcher
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Retryable
    }

    async fn run(&self, state: &TripState, gateway: &Gateway) -> Result<Artifact> {
        let request = state.request();
        let profile = state.require_profile()?;
        let dates = request.dates();

        let research = request
            .destinations
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(|destination| research_destination(destination, &dates, profile, gateway));

        let records = try_join_all(research).await?;

        info!(
            destinations = records.len(),
            with_weather = records.iter().filter(|r| r.weather.is_some()).count(),
            "Destination research complete"
        );

        Ok(Artifact::Destination(DestinationInfo { records }))
    }
}

async fn research_destination(
    destination: &str,
    dates: &[NaiveDate],
    profile: &TripProfile,
    gateway: &Gateway,
) -> Result<DestinationRecord> {
    let weather_queries = dates.iter().map(|date| async move {
        let params = json!({ "destination": destination, "date": date });
        (*date, gateway.query(ProviderKind::Weather, &params).await)
    });

    let search_query = match dates.first() {
        Some(first) => format!("{} travel tips {}", destination, first.format("%B")),
        None => format!("{} travel tips", destination),
    };

    let cost_params = json!({ "destination": destination });
    let search_params = json!({ "query": search_query });
    let (weather_results, cost_result, search_result) = tokio::join!(
        join_all(weather_queries),
        gateway.query(ProviderKind::CostOfLiving, &cost_params),
        gateway.query(ProviderKind::Search, &search_params),
    );

    let weather = collect_weather(destination, weather_results);
    let cost_records = records_or_log(destination, ProviderKind::CostOfLiving, cost_result);
    let search_records = records_or_log(destination, ProviderKind::Search, search_result);

    let cost_of_living_index = cost_records
        .iter()
        .find_map(|r| r.get("index").and_then(Value::as_f64))
        .filter(|index| *index > 0.0);

    let center = cost_records
        .iter()
        .chain(search_records.iter())
        .find_map(coordinates_of);

    let snippets: Vec<&Value> = search_records.iter().take(MAX_SEARCH_SNIPPETS).collect();

    let notes = gateway
        .infer(
            TaskKind::DestinationNotes,
            &json!({
                "destination": destination,
                "dates": dates,
                "profile": profile,
                "weather": weather,
                "cost_of_living_index": cost_of_living_index,
                "search": snippets,
            }),
        )
        .await?;

    Ok(DestinationRecord {
        name: destination.to_string(),
        center,
        weather,
        cost_of_living_index,
        seasonal_notes: note(&notes, "seasonal_notes"),
        safety_notes: note(&notes, "safety_notes"),
        logistics_notes: note(&notes, "logistics_notes"),
    })
}

fn records_or_log(
    destination: &str,
    kind: ProviderKind,
    result: std::result::Result<ProviderResult, ProviderError>,
) -> Vec<Value> {
    match result {
        Ok(result) => result.records,
        Err(ProviderError::NotConfigured(_)) => {
            debug!(destination, provider = %kind, "Provider not configured, leaving field unknown");
            Vec::new()
        }
        Err(e) => {
            warn!(destination, provider = %kind, error = %e, "Provider failed, leaving field unknown");
            Vec::new()
        }
    }
}

/// Known days only; `None` when no day is known.
fn collect_weather(
    destination: &str,
    results: Vec<(NaiveDate, std::result::Result<ProviderResult, ProviderError>)>,
) -> Option<Vec<DailyWeather>> {
    let days: Vec<DailyWeather> = results
        .into_iter()
        .filter_map(|(date, result)| {
            records_or_log(destination, ProviderKind::Weather, result)
                .first()
                .and_then(|record| parse_weather(date, record))
        })
        .collect();

    if days.is_empty() {
        None
    } else {
        Some(days)
    }
}

fn parse_weather(date: NaiveDate, record: &Value) -> Option<DailyWeather> {
    let summary = record.get("summary").and_then(Value::as_str)?.trim();
    if summary.is_empty() {
        return None;
    }

    let date = record
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or(date);

    Some(DailyWeather {
        date,
        summary: summary.to_string(),
        high_c: record.get("high_c").and_then(Value::as_f64),
        low_c: record.get("low_c").and_then(Value::as_f64),
        precipitation_chance: record.get("precipitation_chance").and_then(Value::as_f64),
    })
}

fn coordinates_of(record: &Value) -> Option<Coordinates> {
    Some(Coordinates {
        latitude: record.get("latitude").and_then(Value::as_f64)?,
        longitude: record.get("longitude").and_then(Value::as_f64)?,
    })
}

fn note(notes: &Value, field: &str) -> Option<String> {
    notes
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::ErrorKind;
    use crate::gateway::mock::{ScriptedReasoning, StaticProvider};
    use crate::models::{GroupType, Pace, TravelerComposition, TripRequest};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn state() -> TripState {
        let mut state = TripState::new(TripRequest::new(
            "Paris",
            vec!["Vienna".to_string()],
            NaiveDate::from_ymd_opt(2027, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2027, 9, 3).unwrap(),
            TravelerComposition { adults: 1, children: 0 },
            1500.0,
        ));
        state
            .apply(Artifact::Profile(TripProfile {
                group_type: GroupType::Solo,
                pace: Pace::Relaxed,
                interests: BTreeSet::from(["music".to_string()]),
                styles: BTreeSet::new(),
            }))
            .unwrap();
        state
    }

    fn reasoning() -> ScriptedReasoning {
        ScriptedReasoning::new().with_response(
            TaskKind::DestinationNotes,
            json!({"seasonal_notes": "Opera season opens", "safety_notes": ""}),
        )
    }

    #[tokio::test]
    async fn test_empty_weather_leaves_field_absent() {
        let mut gateway = Gateway::new(Arc::new(reasoning()), GatewayConfig::default());
        gateway.register(Arc::new(StaticProvider::new(ProviderKind::Weather)));
        gateway.register(Arc::new(
            StaticProvider::new(ProviderKind::CostOfLiving).with_default(vec![json!({"index": 1.2})]),
        ));

        let Artifact::Destination(info) = DestinationResearcher.run(&state(), &gateway).await.unwrap() else {
            panic!("expected destination info");
        };

        let record = &info.records[0];
        assert!(record.weather.is_none());
        assert_eq!(record.cost_of_living_index, Some(1.2));
        assert_eq!(record.seasonal_notes.as_deref(), Some("Opera season opens"));
        assert!(record.safety_notes.is_none());
    }

    #[tokio::test]
    async fn test_failing_providers_are_tolerated() {
        let mut gateway = Gateway::new(
            Arc::new(reasoning()),
            GatewayConfig {
                call_retries: 0,
                ..GatewayConfig::default()
            },
        );
        gateway.register(Arc::new(StaticProvider::new(ProviderKind::Weather).failing()));
        gateway.register(Arc::new(StaticProvider::new(ProviderKind::CostOfLiving).failing()));

        let Artifact::Destination(info) = DestinationResearcher.run(&state(), &gateway).await.unwrap() else {
            panic!("expected destination info");
        };

        assert!(info.records[0].weather.is_none());
        assert!(info.records[0].cost_of_living_index.is_none());
        assert_eq!(info.cost_index(), 1.0);
    }

    #[tokio::test]
    async fn test_weather_queried_per_date() {
        let weather = Arc::new(
            StaticProvider::new(ProviderKind::Weather).with_default(vec![json!({"summary": "Clear"})]),
        );
        let mut gateway = Gateway::new(Arc::new(reasoning()), GatewayConfig::default());
        gateway.register(weather.clone());

        let Artifact::Destination(info) = DestinationResearcher.run(&state(), &gateway).await.unwrap() else {
            panic!("expected destination info");
        };

        assert_eq!(weather.calls(), 3);
        let days = info.records[0].weather.as_ref().unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[2].date, NaiveDate::from_ymd_opt(2027, 9, 3).unwrap());
    }

    #[tokio::test]
    async fn test_reasoning_outage_propagates() {
        let reasoning = ScriptedReasoning::new();
        let gateway = Gateway::new(Arc::new(reasoning), GatewayConfig::default());

        let err = DestinationResearcher.run(&state(), &gateway).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    }
}
