use std::sync::Arc;

use dayplan_core::clock::MINUTES_PER_DAY;
use dayplan_core::{
    ActivityEvent, ActivitySuggestion, ClockTime, GeoPoint, PlaceDetails, PlacesProvider,
    ProviderError, ProviderState,
};
use dayplan_observability::AppMetrics;
use tracing::{debug, instrument, warn};

const PHOTO_MAX_WIDTH: u32 = 800;
const DEFAULT_START_MINUTES: u32 = 9 * 60;

/// Cost ladder for places price levels 0 through 4.
pub fn price_tier_cost(price_level: Option<u8>) -> f64 {
    match price_level {
        Some(0) => 10.0,
        Some(1) => 20.0,
        Some(2) => 35.0,
        Some(3) => 60.0,
        Some(4) => 100.0,
        _ => 25.0,
    }
}

/// Activity built only from the suggestion's own fields.
pub fn fallback_activity(suggestion: &ActivitySuggestion) -> ActivityEvent {
    let label = if suggestion.search_query.trim().is_empty() {
        suggestion.name.trim()
    } else {
        suggestion.search_query.trim()
    };
    let (start, end, duration) = suggestion_window(suggestion);

    ActivityEvent {
        id: uuid::Uuid::new_v4().to_string(),
        name: label.to_string(),
        description: suggestion.description.clone(),
        location: label.to_string(),
        start_time: start,
        end_time: end,
        duration,
        cost: suggestion.estimated_cost.max(0.0),
        activity_type: suggestion.activity_type.clone(),
        address: String::new(),
        rating: None,
        image_url: None,
        booking_required: false,
        booking_link: None,
        booking_advice: None,
    }
}

fn activity_from_place(
    suggestion: &ActivitySuggestion,
    details: PlaceDetails,
    image_url: Option<String>,
) -> ActivityEvent {
    let (start, end, duration) = suggestion_window(suggestion);
    let activity_type = if suggestion.activity_type.is_empty() {
        details.types
    } else {
        suggestion.activity_type.clone()
    };

    ActivityEvent {
        id: uuid::Uuid::new_v4().to_string(),
        name: details.name.clone(),
        description: suggestion.description.clone(),
        location: details.name,
        start_time: start,
        end_time: end,
        duration,
        cost: price_tier_cost(details.price_level),
        activity_type,
        address: details.address.unwrap_or_default(),
        rating: details.rating.map(|rating| rating.clamp(0.0, 5.0)),
        image_url,
        booking_required: false,
        booking_link: details.website,
        booking_advice: None,
    }
}

/// Start, end and duration. Durations are capped below a full day so the
/// end time still lies `duration` minutes after the start.
fn suggestion_window(suggestion: &ActivitySuggestion) -> (ClockTime, ClockTime, u32) {
    let start = suggestion
        .start_time
        .unwrap_or(ClockTime::from_minutes(DEFAULT_START_MINUTES));
    let duration = suggestion.duration_minutes.min(MINUTES_PER_DAY - 1);
    (start, start.add_minutes(duration), duration)
}

pub struct ActivityResolver<P> {
    places: ProviderState<P>,
    radius_meters: u32,
    metrics: Arc<AppMetrics>,
}

impl<P> ActivityResolver<P>
where
    P: PlacesProvider,
{
    pub fn new(places: ProviderState<P>, radius_meters: u32, metrics: Arc<AppMetrics>) -> Self {
        Self {
            places,
            radius_meters,
            metrics,
        }
    }

    /// Never fails: lookup problems yield [`fallback_activity`].
    #[instrument(skip(self, suggestion), fields(query = %suggestion.search_query))]
    pub async fn resolve(&self, suggestion: &ActivitySuggestion, near: GeoPoint) -> ActivityEvent {
        match self.lookup(suggestion, near).await {
            Ok(Some(activity)) => activity,
            Ok(None) => {
                debug!("no places matched, using suggestion text");
                self.metrics.inc_places_fallback();
                fallback_activity(suggestion)
            }
            Err(error) => {
                warn!(%error, "places lookup failed, using suggestion text");
                self.metrics.inc_places_fallback();
                fallback_activity(suggestion)
            }
        }
    }

    pub async fn resolve_all(
        &self,
        suggestions: &[ActivitySuggestion],
        near: GeoPoint,
    ) -> Vec<ActivityEvent> {
        let mut activities = Vec::with_capacity(suggestions.len());
        for suggestion in suggestions {
            activities.push(self.resolve(suggestion, near).await);
        }
        activities
    }

    async fn lookup(
        &self,
        suggestion: &ActivitySuggestion,
        near: GeoPoint,
    ) -> Result<Option<ActivityEvent>, ProviderError> {
        let client = self.places.client()?;
        let query = if suggestion.search_query.trim().is_empty() {
            suggestion.name.as_str()
        } else {
            suggestion.search_query.as_str()
        };

        let results = client.search(query, near, self.radius_meters).await?;
        let Some(top) = results.into_iter().next() else {
            return Ok(None);
        };

        let details = client.details(&top.place_id).await?;
        let image_url = match details.photo_reference.as_deref() {
            Some(reference) => match client.photo_url(reference, PHOTO_MAX_WIDTH).await {
                Ok(url) => Some(url),
                Err(error) => {
                    debug!(%error, "photo lookup failed");
                    None
                }
            },
            None => None,
        };

        Ok(Some(activity_from_place(suggestion, details, image_url)))
    }
}
