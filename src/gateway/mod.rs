//! External capability gateway
//!
//! Single access point for the reasoning capability and the data providers
//! (search, places, weather, cost of living). Call-level timeouts and retries
//! live here; stage-level retries belong to the execution engine.

use crate::config::GatewayConfig;
use crate::error::{ErrorKind, PlanningError};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

pub mod gemini;
pub mod http;
pub mod mock;

pub use gemini::GeminiReasoning;
pub use http::HttpDataProvider;

/// What the reasoning capability is being asked to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    AnalyzeTrip,
    DestinationNotes,
    DailyThemes,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Search,
    Places,
    Weather,
    CostOfLiving,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::Search => "search",
            ProviderKind::Places => "places",
            ProviderKind::Weather => "weather",
            ProviderKind::CostOfLiving => "cost_of_living",
        };
        write!(f, "{}", s)
    }
}

/// Records returned by a provider. Empty is a valid answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResult {
    pub records: Vec<Value>,
}

impl ProviderResult {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no {0} provider configured")]
    NotConfigured(ProviderKind),

    #[error("{0} provider timed out")]
    Timeout(ProviderKind),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Timeout(_) | ProviderError::Unavailable(_))
    }
}

/// Maps structured input to structured output for a task (LLM controlled).
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, task: TaskKind, input: &Value) -> Result<Value>;
}

/// A third-party data source.
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn query(
        &self,
        params: &Value,
        timeout: Duration,
    ) -> std::result::Result<ProviderResult, ProviderError>;
}

pub struct Gateway {
    reasoning: Arc<dyn ReasoningCapability>,
    providers: HashMap<ProviderKind, Arc<dyn DataProvider>>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(reasoning: Arc<dyn ReasoningCapability>, config: GatewayConfig) -> Self {
        Self {
            reasoning,
            providers: HashMap::new(),
            config,
        }
    }

    /// Gemini reasoning plus one HTTP provider per configured endpoint.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let api_key = config.gemini_api_key.clone().ok_or_else(|| {
            PlanningError::ConfigError("GEMINI_API_KEY not configured".to_string())
        })?;

        let reasoning = GeminiReasoning::new(api_key, config.gemini_model_url.clone())?;
        let mut gateway = Self::new(Arc::new(reasoning), config.clone());

        let endpoints = [
            (ProviderKind::Places, &config.places_api_url),
            (ProviderKind::Weather, &config.weather_api_url),
            (ProviderKind::CostOfLiving, &config.cost_api_url),
            (ProviderKind::Search, &config.search_api_url),
        ];

        for (kind, url) in endpoints {
            if let Some(url) = url {
                gateway.register(Arc::new(HttpDataProvider::new(kind, url)?));
            }
        }

        Ok(gateway)
    }

    pub fn register(&mut self, provider: Arc<dyn DataProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.call_backoff * 2u32.saturating_pow(attempt)
    }

    /// Ask the reasoning capability, retrying transient failures.
    pub async fn infer(&self, task: TaskKind, input: &Value) -> Result<Value> {
        let mut attempt = 0;

        loop {
            let outcome = match timeout(self.config.call_timeout, self.reasoning.infer(task, input)).await {
                Ok(result) => result,
                Err(_) => Err(PlanningError::CapabilityUnavailable(format!(
                    "{} timed out after {:?}",
                    self.reasoning.name(),
                    self.config.call_timeout
                ))),
            };

            match outcome {
                Ok(value) => {
                    debug!(?task, attempt, "Reasoning call succeeded");
                    return Ok(value);
                }
                Err(e) if e.kind() == ErrorKind::CapabilityUnavailable
                    && attempt < self.config.call_retries =>
                {
                    warn!(?task, attempt, error = %e, "Reasoning call failed, retrying");
                    sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Query a data provider. Partial or empty results are not errors.
    pub async fn query(
        &self,
        kind: ProviderKind,
        params: &Value,
    ) -> std::result::Result<ProviderResult, ProviderError> {
        let provider = self
            .providers
            .get(&kind)
            .ok_or(ProviderError::NotConfigured(kind))?;

        let mut attempt = 0;

        loop {
            let outcome = match timeout(
                self.config.call_timeout,
                provider.query(params, self.config.call_timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(kind)),
            };

            match outcome {
                Ok(result) => {
                    debug!(provider = %kind, records = result.records.len(), "Provider query complete");
                    return Ok(result);
                }
                Err(e) if e.is_transient() && attempt < self.config.call_retries => {
                    warn!(provider = %kind, attempt, error = %e, "Provider query failed, retrying");
                    sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
