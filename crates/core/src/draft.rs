use serde_json::Value;

use crate::clock::ClockTime;
use crate::error::PlanError;
use crate::models::{round_currency, ActivityEvent};

const DEFAULT_DAY_START_MINUTES: u32 = 9 * 60;
const DEFAULT_ACTIVITY_MINUTES: u32 = 60;

/// Reads the activities out of a generated draft. Travel stubs in the draft
/// are dropped since the reconciler synthesizes every travel segment itself.
pub fn draft_activities(draft: &Value) -> Result<Vec<ActivityEvent>, PlanError> {
    let events = draft
        .get("events")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PlanError::MalformedResponse("draft has no events array".to_string())
        })?;

    let mut activities: Vec<ActivityEvent> = Vec::new();
    for entry in events.iter().filter(|entry| !is_travel_stub(entry)) {
        let previous_end = activities.last().map(|activity| activity.end_time);
        if let Some(activity) = activity_from_entry(entry, previous_end) {
            activities.push(activity);
        }
    }

    if activities.is_empty() {
        return Err(PlanError::MalformedResponse(
            "draft contains no usable activities".to_string(),
        ));
    }
    Ok(activities)
}

fn is_travel_stub(entry: &Value) -> bool {
    match entry.get("type").and_then(Value::as_str) {
        Some(kind) => kind.eq_ignore_ascii_case("travel"),
        None => entry.get("startLocation").is_some(),
    }
}

fn activity_from_entry(entry: &Value, previous_end: Option<ClockTime>) -> Option<ActivityEvent> {
    let name = text_field(entry, &["name", "title"]);
    let location = text_field(entry, &["location", "place", "venue"]);
    let (name, location) = match (name, location) {
        (None, None) => return None,
        (Some(name), None) => (name.clone(), name),
        (None, Some(location)) => (location.clone(), location),
        (Some(name), Some(location)) => (name, location),
    };

    let start_time = time_field(entry, "startTime")
        .or(previous_end)
        .unwrap_or(ClockTime::from_minutes(DEFAULT_DAY_START_MINUTES));
    let end_time = time_field(entry, "endTime").unwrap_or_else(|| {
        let minutes = entry
            .get("duration")
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_ACTIVITY_MINUTES);
        start_time.add_minutes(minutes)
    });

    let mut activity = ActivityEvent {
        id: text_field(entry, &["id"]).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name,
        description: text_field(entry, &["description"]).unwrap_or_default(),
        location,
        start_time,
        end_time,
        duration: 0,
        cost: entry.get("cost").map(parse_cost).unwrap_or(0.0),
        activity_type: tags_field(entry.get("activityType")),
        address: text_field(entry, &["address"]).unwrap_or_default(),
        rating: entry
            .get("rating")
            .and_then(Value::as_f64)
            .map(|rating| rating.clamp(0.0, 5.0) as f32),
        image_url: text_field(entry, &["imageUrl"]),
        booking_required: entry
            .get("bookingRequired")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        booking_link: text_field(entry, &["bookingLink"]),
        booking_advice: text_field(entry, &["bookingAdvice"]),
    };
    activity.sync_duration();
    Some(activity)
}

fn text_field(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn time_field(entry: &Value, key: &str) -> Option<ClockTime> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .and_then(|value| value.parse().ok())
}

fn tags_field(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect(),
        Some(Value::String(tag)) => tag
            .split(',')
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Accepts `12.5`, `"12.50"`, `"£12.50"` or `"Free"`; never negative.
pub fn parse_cost(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => {
            let digits: String = text
                .chars()
                .filter(|ch| ch.is_ascii_digit() || *ch == '.')
                .collect();
            digits.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    };
    round_currency(raw.max(0.0))
}
