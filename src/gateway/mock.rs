//! Scripted reasoning and static providers
//!
//! Keeps the pipeline runnable without an LLM or network access, for
//! development and tests.

use super::{DataProvider, Gateway, ProviderError, ProviderKind, ProviderResult, ReasoningCapability, TaskKind};
use crate::config::GatewayConfig;
use crate::error::PlanningError;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays canned responses per task. When more than one response is queued
/// they are served in order and the last one repeats.
#[derive(Default)]
pub struct ScriptedReasoning {
    responses: Mutex<HashMap<TaskKind, VecDeque<Value>>>,
    failures: Mutex<HashMap<TaskKind, u32>>,
    calls: Mutex<HashMap<TaskKind, u32>>,
}

impl ScriptedReasoning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, task: TaskKind, response: Value) -> Self {
        self.with_responses(task, vec![response])
    }

    pub fn with_responses(self, task: TaskKind, responses: Vec<Value>) -> Self {
        if let Ok(mut map) = self.responses.lock() {
            map.insert(task, responses.into());
        }
        self
    }

    /// Fail the first `times` calls for `task` as unavailable.
    pub fn failing(self, task: TaskKind, times: u32) -> Self {
        if let Ok(mut map) = self.failures.lock() {
            map.insert(task, times);
        }
        self
    }

    pub fn calls(&self, task: TaskKind) -> u32 {
        self.calls
            .lock()
            .map(|map| map.get(&task).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

fn poisoned() -> PlanningError {
    PlanningError::InvariantViolation("scripted reasoning lock poisoned".to_string())
}

#[async_trait]
impl ReasoningCapability for ScriptedReasoning {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, task: TaskKind, _input: &Value) -> Result<Value> {
        *self.calls.lock().map_err(|_| poisoned())?.entry(task).or_insert(0) += 1;

        {
            let mut failures = self.failures.lock().map_err(|_| poisoned())?;
            if let Some(remaining) = failures.get_mut(&task) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PlanningError::CapabilityUnavailable(format!(
                        "scripted outage for {:?}",
                        task
                    )));
                }
            }
        }

        let mut responses = self.responses.lock().map_err(|_| poisoned())?;
        let queue = responses.get_mut(&task).ok_or_else(|| {
            PlanningError::CapabilityUnavailable(format!("no scripted response for {:?}", task))
        })?;

        let value = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        value.ok_or_else(|| {
            PlanningError::CapabilityUnavailable(format!("no scripted response for {:?}", task))
        })
    }
}

/// Serves fixed records, optionally keyed by one string field of the query.
pub struct StaticProvider {
    kind: ProviderKind,
    key_field: Option<String>,
    keyed: HashMap<String, Vec<Value>>,
    default: Vec<Value>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl StaticProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            key_field: None,
            keyed: HashMap::new(),
            default: Vec::new(),
            fail: false,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_default(mut self, records: Vec<Value>) -> Self {
        self.default = records;
        self
    }

    /// Serve `records` when `params[field] == value`.
    pub fn with_keyed(mut self, field: &str, value: &str, records: Vec<Value>) -> Self {
        self.key_field = Some(field.to_string());
        self.keyed.insert(value.to_string(), records);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for StaticProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn query(
        &self,
        params: &Value,
        _timeout: Duration,
    ) -> std::result::Result<ProviderResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(ProviderError::Unavailable(format!("static {} outage", self.kind)));
        }

        let keyed = self
            .key_field
            .as_deref()
            .and_then(|field| params.get(field))
            .and_then(Value::as_str)
            .and_then(|key| self.keyed.get(key));

        Ok(ProviderResult::new(
            keyed.cloned().unwrap_or_else(|| self.default.clone()),
        ))
    }
}

/// Profile answer used by the demo gateway.
pub fn sample_profile_response() -> Value {
    json!({
        "group_type": "solo",
        "pace": "relaxed",
        "interests": ["history", "food", "views"],
        "styles": ["budget"]
    })
}

/// Places fixture around central Lisbon.
pub fn sample_places() -> StaticProvider {
    StaticProvider::new(ProviderKind::Places)
        .with_keyed("category", "attraction", vec![
            json!({"id": "castelo", "name": "Castelo de São Jorge", "duration_minutes": 120, "cost": 15.0,
                   "latitude": 38.7139, "longitude": -9.1334, "popularity": 0.95, "tags": ["history", "views"], "must_see": true}),
            json!({"id": "jeronimos", "name": "Jerónimos Monastery", "duration_minutes": 90, "cost": 10.0,
                   "latitude": 38.6979, "longitude": -9.2068, "popularity": 0.9, "tags": ["history"]}),
            json!({"id": "belem-tower", "name": "Belém Tower", "duration_minutes": 60, "cost": 8.0,
                   "latitude": 38.6916, "longitude": -9.2160, "popularity": 0.85, "tags": ["history", "views"]}),
        ])
        .with_keyed("category", "hidden-gem", vec![
            json!({"id": "miradouro-graca", "name": "Miradouro da Graça", "duration_minutes": 45, "cost": 0.0,
                   "latitude": 38.7166, "longitude": -9.1310, "popularity": 0.6, "tags": ["views"]}),
        ])
        .with_keyed("category", "meal", vec![
            json!({"id": "time-out-market", "name": "Time Out Market", "duration_minutes": 60, "cost": 18.0,
                   "latitude": 38.7069, "longitude": -9.1459, "popularity": 0.8, "tags": ["food"]}),
            json!({"id": "pasteis-belem", "name": "Pastéis de Belém", "duration_minutes": 30, "cost": 6.0,
                   "latitude": 38.6975, "longitude": -9.2033, "popularity": 0.9, "tags": ["food"]}),
        ])
        .with_keyed("category", "event", vec![
            json!({"id": "fado-night", "name": "Fado in Alfama", "duration_minutes": 120, "cost": 35.0,
                   "latitude": 38.7112, "longitude": -9.1300, "popularity": 0.7, "tags": ["music", "history"]}),
        ])
        .with_keyed("category", "accommodation", vec![
            json!({"id": "alfama-guesthouse", "name": "Alfama Guesthouse", "nightly_rate": 85.0, "rating": 0.8,
                   "latitude": 38.7118, "longitude": -9.1305}),
            json!({"id": "chiado-hotel", "name": "Hotel do Chiado", "nightly_rate": 190.0, "rating": 0.95,
                   "latitude": 38.7107, "longitude": -9.1421}),
        ])
}

/// A fully offline gateway with Lisbon fixtures.
pub fn demo_gateway(config: GatewayConfig) -> Gateway {
    let reasoning = ScriptedReasoning::new()
        .with_response(TaskKind::AnalyzeTrip, sample_profile_response())
        .with_response(
            TaskKind::DestinationNotes,
            json!({
                "seasonal_notes": "Mild spring weather; expect crowds at Belém on weekends.",
                "safety_notes": "Watch for pickpockets on tram 28.",
                "logistics_notes": "Buy a Viva Viagem card for metro and trams."
            }),
        )
        .with_response(
            TaskKind::DailyThemes,
            json!({"themes": ["Castle & Alfama", "Belém Riverside", "Chiado & Bairro Alto"]}),
        );

    let mut gateway = Gateway::new(Arc::new(reasoning), config);
    gateway.register(Arc::new(sample_places()));
    gateway.register(Arc::new(
        StaticProvider::new(ProviderKind::CostOfLiving)
            .with_default(vec![json!({"index": 0.9, "latitude": 38.7223, "longitude": -9.1393})]),
    ));
    gateway.register(Arc::new(
        StaticProvider::new(ProviderKind::Weather)
            .with_default(vec![json!({"summary": "Sunny", "high_c": 22.0, "low_c": 14.0})]),
    ));
    gateway
}
