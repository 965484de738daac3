use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trip_planner_orchestrator::{
    config::{self, PlannerConfig},
    gateway::{mock::demo_gateway, Gateway},
    Orchestrator, TravelerComposition, TripRequest,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Trip Planner Orchestrator starting");

    let config = config::init(PlannerConfig::from_env()?);

    let gateway = if config.gateway.gemini_api_key.is_some() {
        Gateway::from_config(&config.gateway)?
    } else {
        warn!("GEMINI_API_KEY not set - using the offline demo gateway");
        demo_gateway(config.gateway.clone())
    };

    let orchestrator = Orchestrator::new(Arc::new(gateway), config);

    // Create a sample request
    let start = Utc::now().date_naive() + Duration::days(30);
    let request = TripRequest::new(
        "Madrid",
        vec!["Lisbon".to_string()],
        start,
        start + Duration::days(2),
        TravelerComposition { adults: 1, children: 0 },
        1500.0,
    )
    .with_preferences("History, food and viewpoints. Nothing rushed.");

    info!(
        request_id = %request.request_id,
        destinations = ?request.destinations,
        "Running orchestrator"
    );

    let request_id = request.request_id;

    let outcome = orchestrator.plan(request).await;
    match &outcome {
        Ok(itinerary) => {
            info!("Planning successful");
            println!("\n=== ITINERARY ===");
            println!("{}", serde_json::to_string_pretty(itinerary)?);
        }
        Err(failure) => {
            eprintln!("Planning failed: {}", failure);
        }
    }

    println!("\nReasoning Trace:");
    for audit_id in orchestrator.audit_log().list_for_request(request_id).await? {
        if let Some(record) = orchestrator.audit_log().get(audit_id).await? {
            for (i, trace) in record.reasoning_trace.iter().enumerate() {
                println!("  {}: {}", i + 1, trace);
            }
        }
    }

    if let Err(failure) = outcome {
        return Err(Box::new(failure) as Box<dyn std::error::Error>);
    }

    Ok(())
}
