//! Lodging choice for the nights of the trip

use crate::gateway::{Gateway, ProviderKind};
use crate::models::{Coordinates, DestinationInfo, Lodging, LodgingChoice};
use crate::verification::COST_EPSILON;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const RATING_WEIGHT: f64 = 3.0;
const PRICE_WEIGHT: f64 = 2.0;
const DEFAULT_RATING: f64 = 0.5;

/// Accommodation records for the first destination. A failing or missing
/// places provider yields no lodgings rather than an error.
pub async fn find_lodgings(gateway: &Gateway, destination: &DestinationInfo) -> Vec<Lodging> {
    let Some(record) = destination.records.first() else {
        return Vec::new();
    };

    let params = json!({
        "destination": record.name,
        "category": "accommodation",
        "near": record.center,
    });

    match gateway.query(ProviderKind::Places, &params).await {
        Ok(result) => {
            let lodgings: Vec<Lodging> = result.records.iter().filter_map(parse_lodging).collect();
            if lodgings.len() < result.records.len() {
                warn!(
                    destination = %record.name,
                    skipped = result.records.len() - lodgings.len(),
                    "Skipping malformed lodging records"
                );
            }
            debug!(destination = %record.name, count = lodgings.len(), "Lodging results");
            lodgings
        }
        Err(e) => {
            warn!(destination = %record.name, error = %e, "Lodging query failed");
            Vec::new()
        }
    }
}

fn parse_lodging(raw: &Value) -> Option<Lodging> {
    let id = match raw.get("id")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let name = raw.get("name").and_then(Value::as_str)?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let nightly_rate = raw
        .get("nightly_rate")
        .or_else(|| raw.get("cost"))
        .and_then(Value::as_f64)
        .filter(|rate| rate.is_finite() && *rate >= 0.0)?;

    let position = match (
        raw.get("latitude").and_then(Value::as_f64),
        raw.get("longitude").and_then(Value::as_f64),
    ) {
        (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
        _ => None,
    };

    Some(Lodging {
        id,
        name,
        nightly_rate,
        rating: raw
            .get("rating")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_RATING)
            .clamp(0.0, 1.0),
        position,
    })
}

/// Best lodging whose stay fits the accommodation ceiling.
///
/// Rating and price are blended; within the affordable set the cheapest
/// option gets the full price bonus and the dearest none. Ties go to the
/// cheaper rate, then to provider order. A day trip needs no lodging.
pub fn select_lodging(lodgings: &[Lodging], ceiling: f64, nights: u32) -> Option<LodgingChoice> {
    if nights == 0 {
        return None;
    }

    let affordable: Vec<&Lodging> = lodgings
        .iter()
        .filter(|l| l.nightly_rate * nights as f64 <= ceiling + COST_EPSILON)
        .collect();

    if affordable.is_empty() {
        if !lodgings.is_empty() {
            warn!(ceiling, nights, "No lodging fits the accommodation ceiling");
        }
        return None;
    }

    let cheapest = affordable.iter().map(|l| l.nightly_rate).fold(f64::INFINITY, f64::min);
    let dearest = affordable.iter().map(|l| l.nightly_rate).fold(0.0, f64::max);
    let score = |lodging: &Lodging| {
        let price = if dearest > cheapest {
            1.0 - (lodging.nightly_rate - cheapest) / (dearest - cheapest)
        } else {
            0.0
        };
        RATING_WEIGHT * lodging.rating + PRICE_WEIGHT * price
    };

    let best = affordable.into_iter().min_by(|a, b| {
        score(b)
            .total_cmp(&score(a))
            .then(a.nightly_rate.total_cmp(&b.nightly_rate))
    })?;

    info!(lodging = %best.name, nightly_rate = best.nightly_rate, nights, "Lodging selected");

    Some(LodgingChoice {
        lodging: best.clone(),
        nights,
        total_cost: best.nightly_rate * nights as f64,
    })
}
