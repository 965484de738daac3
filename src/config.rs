//! Process-wide planner configuration
//!
//! Loaded once (optionally from `.env`) before the orchestrator is built and
//! handed explicitly to the gateway and the stages. Nothing below the
//! orchestrator reads the environment.

use crate::error::PlanningError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

static PLANNER_CONFIG: OnceLock<PlannerConfig> = OnceLock::new();

/// Credentials, endpoints and call-level limits for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model_url: String,
    pub places_api_url: Option<String>,
    pub weather_api_url: Option<String>,
    pub cost_api_url: Option<String>,
    pub search_api_url: Option<String>,
    pub call_timeout: Duration,
    /// Extra attempts per gateway call after the first.
    pub call_retries: u32,
    pub call_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
            places_api_url: None,
            weather_api_url: None,
            cost_api_url: None,
            search_api_url: None,
            call_timeout: Duration::from_secs(20),
            call_retries: 1,
            call_backoff: Duration::from_millis(250),
        }
    }
}

/// Stage-boundary failure handling.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stage_timeout: Duration,
    /// Attempt limit for retryable stages (first attempt included).
    pub max_stage_attempts: u32,
    /// Backoff before the second attempt; doubles on each later one.
    pub base_backoff: Duration,
    /// Planning records the orchestrator's audit log retains.
    pub audit_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(120),
            max_stage_attempts: 3,
            base_backoff: Duration::from_millis(500),
            audit_capacity: crate::audit::DEFAULT_AUDIT_CAPACITY,
        }
    }
}

/// Tuning constants for the itinerary builder. Times are minutes after midnight.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub day_start_minute: u32,
    pub day_end_minute: u32,
    pub relaxed_cap_minutes: u32,
    pub intense_cap_minutes: u32,
    pub breakfast: (u32, u32),
    pub lunch: (u32, u32),
    pub dinner: (u32, u32),
    pub max_candidates_per_day: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            day_start_minute: 8 * 60,
            day_end_minute: 22 * 60,
            relaxed_cap_minutes: 6 * 60,
            intense_cap_minutes: 10 * 60,
            breakfast: (8 * 60, 45),
            lunch: (12 * 60 + 30, 60),
            dinner: (19 * 60, 90),
            max_candidates_per_day: 8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlannerConfig {
    pub gateway: GatewayConfig,
    pub pipeline: PipelineConfig,
    pub schedule: ScheduleConfig,
}

impl PlannerConfig {
    /// Build from `.env` plus the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        config.gateway.gemini_api_key = non_empty_var("GEMINI_API_KEY");
        if let Some(url) = non_empty_var("GEMINI_MODEL_URL") {
            config.gateway.gemini_model_url = url;
        }
        config.gateway.places_api_url = non_empty_var("PLACES_API_URL");
        config.gateway.weather_api_url = non_empty_var("WEATHER_API_URL");
        config.gateway.cost_api_url = non_empty_var("COST_API_URL");
        config.gateway.search_api_url = non_empty_var("SEARCH_API_URL");

        if let Some(secs) = parse_var::<u64>("PLANNER_CALL_TIMEOUT_SECS")? {
            config.gateway.call_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>("PLANNER_CALL_RETRIES")? {
            config.gateway.call_retries = retries;
        }
        if let Some(secs) = parse_var::<u64>("PLANNER_STAGE_TIMEOUT_SECS")? {
            config.pipeline.stage_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32>("PLANNER_MAX_STAGE_ATTEMPTS")? {
            config.pipeline.max_stage_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_var::<u64>("PLANNER_BACKOFF_MS")? {
            config.pipeline.base_backoff = Duration::from_millis(ms);
            config.gateway.call_backoff = Duration::from_millis(ms / 2);
        }
        if let Some(capacity) = parse_var::<usize>("PLANNER_AUDIT_CAPACITY")? {
            config.pipeline.audit_capacity = capacity.max(1);
        }

        Ok(config)
    }
}

/// Install the process-wide configuration. Only the first call wins.
pub fn init(config: PlannerConfig) -> &'static PlannerConfig {
    PLANNER_CONFIG.get_or_init(|| config)
}

/// The installed configuration, if [`init`] has run.
pub fn global() -> Option<&'static PlannerConfig> {
    PLANNER_CONFIG.get()
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty_var(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            PlanningError::ConfigError(format!("{} has an invalid value '{}'", name, raw))
        }),
    }
}
