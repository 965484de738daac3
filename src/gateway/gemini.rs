//! Gemini-backed reasoning capability
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{ReasoningCapability, TaskKind};
use crate::error::PlanningError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiReasoning {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiReasoning {
    pub fn new(api_key: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| PlanningError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn generate(&self, system_prompt: &str, query: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(PlanningError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: query.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
                response_mime_type: "application/json".to_string(),
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
        };

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            error!("Gemini API request failed: {}", e);
            PlanningError::CapabilityUnavailable(format!("Gemini API error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(PlanningError::CapabilityUnavailable(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            PlanningError::MalformedArtifact(format!("Gemini response parse error: {}", e))
        })?;

        gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| PlanningError::MalformedArtifact("Empty response from Gemini".to_string()))
    }
}

fn system_prompt(task: TaskKind) -> &'static str {
    match task {
        TaskKind::AnalyzeTrip => {
            r#"You are a travel psychology expert. Classify the trip request.
Return ONLY a JSON object:
{
  "group_type": "solo" | "couple" | "family" | "group",
  "pace": "relaxed" | "intense" | "mixed",
  "interests": ["<lowercase interest tag>", ...],
  "styles": ["<lowercase travel style tag>", ...]
}
Do not mention specific places."#
        }
        TaskKind::DestinationNotes => {
            r#"You are a destination researcher. Using the provided weather, cost and
search context, write short practical notes.
Return ONLY a JSON object:
{
  "seasonal_notes": "<string or null>",
  "safety_notes": "<string or null>",
  "logistics_notes": "<string or null>"
}"#
        }
        TaskKind::DailyThemes => {
            r#"You are an itinerary planner. Give each day of the trip a short theme
that groups nearby places and related interests, avoiding zigzags across the city.
Return ONLY a JSON object with exactly one theme per day, in day order:
{
  "themes": ["<theme for day 1>", "<theme for day 2>", ...]
}"#
        }
    }
}

#[async_trait]
impl ReasoningCapability for GeminiReasoning {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn infer(&self, task: TaskKind, input: &Value) -> Result<Value> {
        let query = serde_json::to_string_pretty(input)?;

        info!(?task, "Calling Gemini API");
        let raw = self.generate(system_prompt(task), &query).await?;

        parse_json_response(&raw)
    }
}

/// Strip optional markdown fences and parse the model output as JSON.
fn parse_json_response(response: &str) -> Result<Value> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| {
        PlanningError::MalformedArtifact(format!(
            "Failed to parse Gemini response: {} | raw={}",
            e, response
        ))
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    response_mime_type: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
