use serde::{Deserialize, Serialize};

use crate::clock::ClockTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Walking,
    Driving,
    Cycling,
    Transit,
}

impl TransportMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "walking" | "walk" | "foot" => Some(Self::Walking),
            "driving" | "drive" | "car" | "taxi" => Some(Self::Driving),
            "cycling" | "bicycling" | "bike" => Some(Self::Cycling),
            "transit" | "bus" | "train" | "subway" => Some(Self::Transit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Walking => "walking",
            Self::Driving => "driving",
            Self::Cycling => "cycling",
            Self::Transit => "transit",
        }
    }

    /// Assumed average speed in miles per hour.
    pub fn speed_mph(self) -> f64 {
        match self {
            Self::Walking => 3.0,
            Self::Cycling => 12.0,
            Self::Transit => 15.0,
            Self::Driving => 25.0,
        }
    }

    pub fn cost_per_mile(self) -> f64 {
        match self {
            Self::Driving => 0.5,
            Self::Transit => 1.5,
            Self::Walking | Self::Cycling => 0.0,
        }
    }

    pub fn cost_for(self, distance_miles: f64) -> f64 {
        round_currency(self.cost_per_mile() * distance_miles.max(0.0))
    }
}

pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub duration: u32,
    pub cost: f64,
    pub activity_type: Vec<String>,
    pub address: String,
    pub rating: Option<f32>,
    pub image_url: Option<String>,
    pub booking_required: bool,
    pub booking_link: Option<String>,
    pub booking_advice: Option<String>,
}

impl ActivityEvent {
    /// Recomputes `duration` from the start and end times.
    pub fn sync_duration(&mut self) {
        self.duration = self.start_time.minutes_until(self.end_time);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    pub instruction: String,
    /// miles
    pub distance: f64,
    /// minutes
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelEvent {
    pub id: String,
    pub start_location: String,
    pub end_location: String,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub duration: u32,
    pub mode: TransportMode,
    pub cost: f64,
    /// miles
    pub distance: f64,
    pub booking_required: bool,
    pub booking_link: Option<String>,
    pub booking_advice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_detail: Option<Vec<RouteStep>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItineraryEvent {
    Activity(ActivityEvent),
    Travel(TravelEvent),
}

impl ItineraryEvent {
    pub fn cost(&self) -> f64 {
        match self {
            Self::Activity(activity) => activity.cost,
            Self::Travel(travel) => travel.cost,
        }
    }

    pub fn duration(&self) -> u32 {
        match self {
            Self::Activity(activity) => activity.duration,
            Self::Travel(travel) => travel.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub id: String,
    pub location: String,
    pub events: Vec<ItineraryEvent>,
    pub total_cost: f64,
    pub total_duration: u32,
    #[serde(default)]
    pub degraded: bool,
}

impl Itinerary {
    /// Interleaves activities with the travel between them. `travels[i]` is
    /// the segment from `activities[i]` to `activities[i + 1]`; surplus
    /// travel entries are ignored.
    pub fn assemble(
        location: impl Into<String>,
        activities: Vec<ActivityEvent>,
        travels: Vec<TravelEvent>,
    ) -> Self {
        let mut events = Vec::with_capacity(activities.len() * 2);
        let mut travels = travels.into_iter();
        let count = activities.len();

        for (index, activity) in activities.into_iter().enumerate() {
            events.push(ItineraryEvent::Activity(activity));
            if index + 1 < count {
                if let Some(travel) = travels.next() {
                    events.push(ItineraryEvent::Travel(travel));
                }
            }
        }

        let mut itinerary = Self {
            id: uuid::Uuid::new_v4().to_string(),
            location: location.into(),
            events,
            total_cost: 0.0,
            total_duration: 0,
            degraded: false,
        };
        itinerary.recompute_totals();
        itinerary
    }

    pub fn recompute_totals(&mut self) {
        self.total_cost = round_currency(self.events.iter().map(ItineraryEvent::cost).sum());
        self.total_duration = self.events.iter().map(ItineraryEvent::duration).sum();
    }

    pub fn activities(&self) -> impl Iterator<Item = &ActivityEvent> {
        self.events.iter().filter_map(|event| match event {
            ItineraryEvent::Activity(activity) => Some(activity),
            ItineraryEvent::Travel(_) => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySuggestion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub search_query: String,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default = "default_suggestion_minutes")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub activity_type: Vec<String>,
    #[serde(default)]
    pub start_time: Option<ClockTime>,
}

fn default_suggestion_minutes() -> u32 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelOptions {
    #[serde(default = "default_preferred_modes")]
    pub preferred_modes: Vec<TransportMode>,
    #[serde(default = "default_max_walking_distance")]
    pub max_walking_distance: f64,
    #[serde(default)]
    pub avoid_highways: bool,
    #[serde(default)]
    pub avoid_tolls: bool,
}

impl Default for TravelOptions {
    fn default() -> Self {
        Self {
            preferred_modes: default_preferred_modes(),
            max_walking_distance: default_max_walking_distance(),
            avoid_highways: false,
            avoid_tolls: false,
        }
    }
}

fn default_preferred_modes() -> Vec<TransportMode> {
    vec![
        TransportMode::Walking,
        TransportMode::Driving,
        TransportMode::Transit,
    ]
}

fn default_max_walking_distance() -> f64 {
    1.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlanRequest {
    pub location: String,
    #[serde(default)]
    pub preferences: Vec<String>,
    #[serde(default)]
    pub start_time: Option<ClockTime>,
    #[serde(default)]
    pub end_time: Option<ClockTime>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub travel: Option<TravelOptions>,
}
