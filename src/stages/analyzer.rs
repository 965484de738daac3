//! Trip analyzer: raw request to trip profile

use super::{tag_set, FailurePolicy, Stage, StageId};
use crate::error::PlanningError;
use crate::gateway::{Gateway, TaskKind};
use crate::models::{GroupType, Pace, TripProfile};
use crate::state::{Artifact, TripState};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

pub struct TripAnalyzer;

#[async_trait]
impl Stage for TripAnalyzer {
    fn id(&self) -> StageId {
        StageId::TripAnalyzer
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Retryable
    }

    async fn run(&self, state: &TripState, gateway: &Gateway) -> Result<Artifact> {
        let request = state.request();
        request.validate()?;

        let input = json!({
            "request": request,
            "summary": request.format_for_llm(),
        });

        let output = gateway.infer(TaskKind::AnalyzeTrip, &input).await?;
        let profile = parse_profile(&output)?;

        info!(
            group = %profile.group_type,
            pace = %profile.pace,
            interests = profile.interests.len(),
            "Trip profile derived"
        );

        Ok(Artifact::Profile(profile))
    }
}

fn parse_profile(output: &Value) -> Result<TripProfile> {
    let group_type = output
        .get("group_type")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| PlanningError::MalformedArtifact("profile has no group type".to_string()))?
        .parse::<GroupType>()?;

    let pace = match output.get("pace").and_then(Value::as_str) {
        Some(raw) => raw.parse::<Pace>().unwrap_or_else(|_| {
            warn!(pace = raw, "Unrecognized pace, using mixed");
            Pace::Mixed
        }),
        None => Pace::Mixed,
    };

    let interests = tag_set(output.get("interests"));
    if interests.is_empty() {
        return Err(PlanningError::MalformedArtifact(
            "profile has no interest tags".to_string(),
        ));
    }

    Ok(TripProfile {
        group_type,
        pace,
        interests,
        styles: tag_set(output.get("styles")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::ErrorKind;
    use crate::gateway::mock::ScriptedReasoning;
    use crate::models::{TravelerComposition, TripRequest};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn state(budget: f64) -> TripState {
        TripState::new(TripRequest::new(
            "Madrid",
            vec!["Porto".to_string()],
            NaiveDate::from_ymd_opt(2027, 6, 10).unwrap(),
            NaiveDate::from_ymd_opt(2027, 6, 12).unwrap(),
            TravelerComposition { adults: 2, children: 1 },
            budget,
        ))
    }

    fn gateway(response: Value) -> Gateway {
        let reasoning = ScriptedReasoning::new().with_response(TaskKind::AnalyzeTrip, response);
        Gateway::new(Arc::new(reasoning), GatewayConfig::default())
    }

    #[tokio::test]
    async fn test_profile_is_normalized() {
        let gateway = gateway(json!({
            "group_type": "Family",
            "pace": "balanced",
            "interests": ["Beaches", "beaches", "Food "],
        }));

        let artifact = TripAnalyzer.run(&state(2000.0), &gateway).await.unwrap();
        let Artifact::Profile(profile) = artifact else {
            panic!("expected profile");
        };
        assert_eq!(profile.group_type, GroupType::Family);
        assert_eq!(profile.pace, Pace::Mixed);
        assert_eq!(profile.interests.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_interests_is_malformed() {
        let gateway = gateway(json!({"group_type": "couple", "pace": "relaxed", "interests": []}));
        let err = TripAnalyzer.run(&state(2000.0), &gateway).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedArtifact);
    }

    #[tokio::test]
    async fn test_blank_group_type_is_malformed() {
        let gateway = gateway(json!({"group_type": " ", "interests": ["art"]}));
        let err = TripAnalyzer.run(&state(2000.0), &gateway).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedArtifact);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_reasoning() {
        let reasoning = Arc::new(ScriptedReasoning::new());
        let gateway = Gateway::new(reasoning.clone(), GatewayConfig::default());

        let err = TripAnalyzer.run(&state(0.0), &gateway).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(reasoning.calls(TaskKind::AnalyzeTrip), 0);
    }
}
