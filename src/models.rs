//! Core data models for the trip planner

use crate::error::PlanningError;
use crate::Result;
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Solo,
    Couple,
    Family,
    Group,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Pace {
    Relaxed,
    Intense,
    Mixed,
}

/// Pace in effect for one concrete day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayPace {
    Relaxed,
    Intense,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityCategory {
    Attraction,
    HiddenGem,
    Meal,
    Event,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MealKind {
    Breakfast,
    Lunch,
    Dinner,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Walking,
    PublicTransport,
    Taxi,
}

impl Pace {
    /// Pace for the zero-based `day_index`; mixed trips alternate starting relaxed.
    pub fn for_day(self, day_index: usize) -> DayPace {
        match self {
            Pace::Relaxed => DayPace::Relaxed,
            Pace::Intense => DayPace::Intense,
            Pace::Mixed if day_index % 2 == 0 => DayPace::Relaxed,
            Pace::Mixed => DayPace::Intense,
        }
    }
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 4] = [
        ActivityCategory::Attraction,
        ActivityCategory::HiddenGem,
        ActivityCategory::Meal,
        ActivityCategory::Event,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityCategory::Attraction => "attraction",
            ActivityCategory::HiddenGem => "hidden-gem",
            ActivityCategory::Meal => "meal",
            ActivityCategory::Event => "event",
        }
    }
}

impl FromStr for GroupType {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "solo" => Ok(GroupType::Solo),
            "couple" => Ok(GroupType::Couple),
            "family" => Ok(GroupType::Family),
            "group" | "friends" => Ok(GroupType::Group),
            other => Err(PlanningError::MalformedArtifact(format!(
                "unknown group type '{}'",
                other
            ))),
        }
    }
}

impl FromStr for Pace {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "relaxed" | "slow" => Ok(Pace::Relaxed),
            "intense" | "packed" | "fast" => Ok(Pace::Intense),
            "mixed" | "balanced" => Ok(Pace::Mixed),
            other => Err(PlanningError::MalformedArtifact(format!(
                "unknown pace '{}'",
                other
            ))),
        }
    }
}

impl FromStr for ActivityCategory {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "attraction" | "landmark" => Ok(ActivityCategory::Attraction),
            "hidden-gem" => Ok(ActivityCategory::HiddenGem),
            "meal" | "restaurant" => Ok(ActivityCategory::Meal),
            "event" => Ok(ActivityCategory::Event),
            other => Err(PlanningError::MalformedArtifact(format!(
                "unknown activity category '{}'",
                other
            ))),
        }
    }
}

//
// ================= Request =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TravelerComposition {
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
}

impl TravelerComposition {
    pub fn total(&self) -> u32 {
        self.adults + self.children
    }
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRequest {
    pub request_id: Uuid,
    pub origin: String,
    pub destinations: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub travelers: TravelerComposition,
    #[serde(default)]
    pub preferences: String,
    /// Total budget ceiling for the whole trip.
    pub budget: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl TripRequest {
    pub fn new(
        origin: impl Into<String>,
        destinations: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        travelers: TravelerComposition,
        budget: f64,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            origin: origin.into(),
            destinations,
            start_date,
            end_date,
            travelers,
            preferences: String::new(),
            budget,
            currency: default_currency(),
        }
    }

    pub fn with_preferences(mut self, preferences: impl Into<String>) -> Self {
        self.preferences = preferences.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.destinations.iter().all(|d| d.trim().is_empty()) {
            return Err(PlanningError::InvalidRequest(
                "at least one destination is required".to_string(),
            ));
        }
        if self.start_date > self.end_date {
            return Err(PlanningError::InvalidRequest(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if !(self.budget > 0.0) {
            return Err(PlanningError::InvalidRequest(
                "budget must be positive".to_string(),
            ));
        }
        if self.travelers.total() == 0 {
            return Err(PlanningError::InvalidRequest(
                "at least one traveler is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn total_days(&self) -> usize {
        ((self.end_date - self.start_date).num_days() + 1).max(0) as usize
    }

    pub fn total_nights(&self) -> u32 {
        self.total_days().saturating_sub(1) as u32
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Every date of the trip, inclusive of both ends.
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..self.total_days() as i64)
            .map(|offset| self.start_date + Duration::days(offset))
            .collect()
    }

    pub fn format_for_llm(&self) -> String {
        format!(
            "- From: {}\n- To: {}\n- Duration: {} days ({} to {})\n- Budget: {:.2} {}\n- Group: {} adult(s), {} child(ren)\n- Preferences: {}",
            self.origin,
            self.destinations.join(", "),
            self.total_days(),
            self.start_date,
            self.end_date,
            self.budget,
            self.currency,
            self.travelers.adults,
            self.travelers.children,
            self.preferences,
        )
    }
}

//
// ================= Profile =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripProfile {
    pub group_type: GroupType,
    pub pace: Pace,
    pub interests: BTreeSet<String>,
    #[serde(default)]
    pub styles: BTreeSet<String>,
}

//
// ================= Destination =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyWeather {
    pub date: NaiveDate,
    pub summary: String,
    #[serde(default)]
    pub high_c: Option<f64>,
    #[serde(default)]
    pub low_c: Option<f64>,
    #[serde(default)]
    pub precipitation_chance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationRecord {
    pub name: String,
    pub center: Option<Coordinates>,
    /// `None` when no provider returned weather for any date of the trip.
    pub weather: Option<Vec<DailyWeather>>,
    pub cost_of_living_index: Option<f64>,
    pub seasonal_notes: Option<String>,
    pub safety_notes: Option<String>,
    pub logistics_notes: Option<String>,
}

impl DestinationRecord {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            center: None,
            weather: None,
            cost_of_living_index: None,
            seasonal_notes: None,
            safety_notes: None,
            logistics_notes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationInfo {
    pub records: Vec<DestinationRecord>,
}

impl DestinationInfo {
    /// Mean of the known cost-of-living indices; 1.0 when none is known.
    pub fn cost_index(&self) -> f64 {
        let known: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.cost_of_living_index)
            .collect();

        if known.is_empty() {
            1.0
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        }
    }

    pub fn weather_on(&self, date: NaiveDate) -> Option<&DailyWeather> {
        self.records
            .iter()
            .filter_map(|r| r.weather.as_ref())
            .flat_map(|days| days.iter())
            .find(|w| w.date == date)
    }

    pub fn primary_center(&self) -> Option<Coordinates> {
        self.records.iter().find_map(|r| r.center)
    }
}

//
// ================= Activities =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub category: ActivityCategory,
    pub duration_minutes: u32,
    pub cost: f64,
    pub position: Coordinates,
    pub popularity: f64,
    pub fit_score: f64,
    pub tags: BTreeSet<String>,
    pub must_see: bool,
    /// Position in the provider's combined result order.
    pub provider_rank: u32,
    pub destination: String,
    /// Dated events are only scheduled on this date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivitySet {
    activities: Vec<Activity>,
}

impl ActivitySet {
    /// Builds a set keeping the first occurrence of every id.
    pub fn from_ordered(candidates: Vec<Activity>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let activities = candidates
            .into_iter()
            .filter(|a| seen.insert(a.id.clone()))
            .collect();
        Self { activities }
    }

    pub fn into_inner(self) -> Vec<Activity> {
        self.activities
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn must_see_total(&self) -> f64 {
        self.activities
            .iter()
            .filter(|a| a.must_see)
            .map(|a| a.cost)
            .sum()
    }
}

//
// ================= Lodging =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lodging {
    pub id: String,
    pub name: String,
    /// Price for the whole party per night.
    pub nightly_rate: f64,
    /// Provider rating normalised to 0..=1.
    pub rating: f64,
    pub position: Option<Coordinates>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LodgingChoice {
    pub lodging: Lodging,
    pub nights: u32,
    pub total_cost: f64,
}

//
// ================= Budget =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CategoryCeilings {
    pub accommodation: f64,
    pub transport: f64,
    pub activities: f64,
    pub meals: f64,
}

impl CategoryCeilings {
    pub fn total(&self) -> f64 {
        self.accommodation + self.transport + self.activities + self.meals
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityBudget {
    pub activity_id: String,
    pub affordable: bool,
    pub priority: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetPlan {
    pub total_ceiling: f64,
    pub must_see_total: f64,
    pub ceilings: CategoryCeilings,
    pub allocations: Vec<ActivityBudget>,
}

impl BudgetPlan {
    pub fn allocation(&self, activity_id: &str) -> Option<&ActivityBudget> {
        self.allocations.iter().find(|a| a.activity_id == activity_id)
    }
}

//
// ================= Itinerary =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledSlot {
    /// `None` for a generic meal without a chosen venue.
    pub activity_id: Option<String>,
    pub name: String,
    pub category: ActivityCategory,
    pub meal: Option<MealKind>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub cost: f64,
    pub must_see: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TravelLeg {
    pub from_activity_id: Option<String>,
    pub to_activity_id: String,
    pub mode: TransportMode,
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub cost: f64,
    pub departs: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Day {
    pub day_number: u32,
    pub date: NaiveDate,
    pub theme: String,
    pub pace: DayPace,
    pub slots: Vec<ScheduledSlot>,
    pub legs: Vec<TravelLeg>,
    /// Activity durations plus travel legs; meals excluded.
    pub active_minutes: u32,
    /// Active minutes relative to the day's pace cap.
    pub intensity: f64,
    pub total_cost: f64,
    pub weather: Option<DailyWeather>,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    /// Cost of the chosen lodging, or the reserved ceiling when none was chosen.
    pub accommodation: f64,
    pub transport: f64,
    pub activities: f64,
    pub meals: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Itinerary {
    pub trip_id: Uuid,
    pub destinations: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: Vec<Day>,
    /// Scheduled spend: transport, activities and meals.
    pub total_cost: f64,
    pub breakdown: CostBreakdown,
    pub lodging: Option<LodgingChoice>,
    pub dropped: Vec<String>,
}

impl Itinerary {
    pub fn placed_activity_ids(&self) -> impl Iterator<Item = &str> {
        self.days
            .iter()
            .flat_map(|d| d.slots.iter())
            .filter_map(|s| s.activity_id.as_deref())
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupType::Solo => "solo",
            GroupType::Couple => "couple",
            GroupType::Family => "family",
            GroupType::Group => "group",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Pace::Relaxed => "relaxed",
            Pace::Intense => "intense",
            Pace::Mixed => "mixed",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
