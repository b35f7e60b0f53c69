use crate::clock::ClockTime;
use crate::error::PlanError;
use crate::models::{ActivityEvent, DayPlanRequest};

const DEFAULT_START: u32 = 9 * 60;
const DEFAULT_END: u32 = 18 * 60;

pub fn validate_request(request: &DayPlanRequest) -> Result<(), PlanError> {
    if request.location.trim().is_empty() {
        return Err(PlanError::InvalidInput("location is required".to_string()));
    }
    if request
        .preferences
        .iter()
        .all(|preference| preference.trim().is_empty())
    {
        return Err(PlanError::InvalidInput(
            "at least one preference is required".to_string(),
        ));
    }
    if let Some(budget) = request.budget {
        if !budget.is_finite() || budget < 0.0 {
            return Err(PlanError::InvalidInput(
                "budget must be a non-negative amount".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn day_window(request: &DayPlanRequest) -> (ClockTime, ClockTime) {
    (
        request
            .start_time
            .unwrap_or(ClockTime::from_minutes(DEFAULT_START)),
        request.end_time.unwrap_or(ClockTime::from_minutes(DEFAULT_END)),
    )
}

pub fn build_day_prompt(request: &DayPlanRequest) -> String {
    let (start, end) = day_window(request);
    let preferences = request
        .preferences
        .iter()
        .map(|preference| preference.trim())
        .filter(|preference| !preference.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let budget = request
        .budget
        .map(|budget| format!("Keep the total cost under {budget:.2}."))
        .unwrap_or_default();

    format!(
        "Plan a single day in {location} between {start} and {end} for someone who enjoys: {preferences}. {budget}\n\
         Respond with a JSON object only, no commentary, shaped as:\n\
         {{\"events\": [{{\"type\": \"activity\", \"name\": string, \"description\": string, \
         \"location\": string, \"startTime\": \"HH:MM\", \"endTime\": \"HH:MM\", \"cost\": number, \
         \"activityType\": [string], \"address\": string, \"bookingRequired\": boolean, \
         \"bookingAdvice\": string | null}}]}}\n\
         List activities in chronological order, use 24-hour times, leave gaps between \
         activities for travel, and use real venue names for every location.",
        location = request.location.trim(),
    )
}

/// A generic but valid day used when generation is exhausted.
pub fn fallback_day_activities(request: &DayPlanRequest) -> Vec<ActivityEvent> {
    let location = request.location.trim();
    let (start, _) = day_window(request);

    let slots: [(&str, String, u32, u32, f64, &str); 3] = [
        (
            "Morning walking tour",
            format!("{location} old town"),
            0,
            90,
            0.0,
            "sightseeing",
        ),
        (
            "Lunch at a local favourite",
            format!("{location} central market"),
            150,
            60,
            20.0,
            "food",
        ),
        (
            "Afternoon at the main museum",
            format!("{location} city museum"),
            270,
            120,
            15.0,
            "culture",
        ),
    ];

    slots
        .into_iter()
        .map(|(name, place, offset, minutes, cost, tag)| {
            let start_time = start.add_minutes(offset);
            ActivityEvent {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                description: format!("{name} in {location}."),
                location: place.clone(),
                start_time,
                end_time: start_time.add_minutes(minutes),
                duration: minutes,
                cost,
                activity_type: vec![tag.to_string()],
                address: place,
                rating: None,
                image_url: None,
                booking_required: false,
                booking_link: None,
                booking_advice: None,
            }
        })
        .collect()
}
