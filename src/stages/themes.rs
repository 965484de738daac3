//! Daily themes: one short headline per day of the trip

use crate::gateway::{Gateway, TaskKind};
use crate::models::{ActivitySet, TripRequest};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Used in rotation whenever the reasoning capability cannot provide themes.
pub const FALLBACK_THEMES: [&str; 7] = [
    "Historic City Center",
    "Museums & Culture",
    "Local Neighborhoods",
    "Nature & Parks",
    "Food & Markets",
    "Hidden Gems",
    "Relaxation Day",
];

/// Theme for the zero-based `day_index` from the fallback rotation.
pub fn fallback_theme(day_index: usize) -> String {
    FALLBACK_THEMES[day_index % FALLBACK_THEMES.len()].to_string()
}

pub fn fallback_themes(days: usize) -> Vec<String> {
    (0..days).map(fallback_theme).collect()
}

/// Ask for one theme per day. Never fails: an unavailable capability or an
/// unusable answer falls back to the fixed rotation.
pub async fn daily_themes(gateway: &Gateway, request: &TripRequest, activities: &ActivitySet) -> Vec<String> {
    let days = request.total_days();
    let input = json!({
        "trip": request.format_for_llm(),
        "destinations": request.destinations,
        "days": days,
        "places": activities.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
    });

    match gateway.infer(TaskKind::DailyThemes, &input).await {
        Ok(value) => match themes_from_response(&value, days) {
            Some(themes) => themes,
            None => {
                warn!("Theme response had no usable themes, using fallback rotation");
                fallback_themes(days)
            }
        },
        Err(e) => {
            warn!(error = %e, "Theme generation failed, using fallback rotation");
            fallback_themes(days)
        }
    }
}

/// Exactly `days` themes from `{"themes": [...]}` or a bare array. Missing
/// days become "Exploration Day N"; `None` when nothing usable came back.
fn themes_from_response(value: &Value, days: usize) -> Option<Vec<String>> {
    let items = value
        .get("themes")
        .and_then(Value::as_array)
        .or_else(|| value.as_array())?;

    let mut themes: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(days)
        .map(str::to_string)
        .collect();

    if themes.is_empty() {
        return None;
    }

    if themes.len() < days {
        debug!(got = themes.len(), days, "Padding daily themes");
    }
    let padding: Vec<String> = (themes.len()..days)
        .map(|i| format!("Exploration Day {}", i + 1))
        .collect();
    themes.extend(padding);

    Some(themes)
}
