use std::sync::Arc;
use std::time::Duration;

use dayplan_core::{
    round_currency, ClockTime, PlanError, ProviderState, Route, RouteRequest, RouteStep,
    RoutingProvider, TransportMode, TravelEvent, TravelOptions,
};
use dayplan_observability::AppMetrics;
use futures::future::join_all;
use rand::Rng;
use tracing::{debug, instrument, warn};
use url::Url;

/// Durations within this many minutes are compared on cost instead.
pub const DURATION_TOLERANCE_MINUTES: u32 = 5;
pub const MIN_FALLBACK_MINUTES: u32 = 5;
const FALLBACK_MIN_MILES: f64 = 0.1;
const FALLBACK_MAX_MILES: f64 = 2.1;
const DIRECTIONS_BASE: &str = "https://www.google.com/maps/dir/";
const TRANSIT_BOOKING_ADVICE: &str =
    "Buy a ticket or use a contactless card before boarding. Check the operator for live times.";

#[derive(Debug, Clone, PartialEq)]
pub struct TravelCandidate {
    pub mode: TransportMode,
    pub distance_miles: f64,
    pub duration_minutes: u32,
    pub cost: f64,
    pub steps: Vec<RouteStep>,
}

impl TravelCandidate {
    pub fn from_route(mode: TransportMode, route: Route) -> Self {
        Self {
            mode,
            distance_miles: route.distance_miles,
            duration_minutes: route.duration_minutes,
            cost: mode.cost_for(route.distance_miles),
            steps: route.steps,
        }
    }

    fn is_short_walk(&self, max_walking_distance: f64) -> bool {
        self.mode == TransportMode::Walking && self.distance_miles <= max_walking_distance
    }
}

/// Picks the best candidate in order. A short walk wins as soon as it is
/// seen and, once best, is never replaced by a non-walk.
pub fn select_best(
    candidates: impl IntoIterator<Item = TravelCandidate>,
    max_walking_distance: f64,
) -> Option<TravelCandidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) if outranks(&candidate, &current, max_walking_distance) => Some(candidate),
        Some(current) => Some(current),
    })
}

fn outranks(candidate: &TravelCandidate, current: &TravelCandidate, max_walking: f64) -> bool {
    if candidate.is_short_walk(max_walking) {
        return true;
    }
    if current.is_short_walk(max_walking) {
        return false;
    }
    if candidate.duration_minutes.abs_diff(current.duration_minutes) <= DURATION_TOLERANCE_MINUTES {
        candidate.cost < current.cost
    } else {
        candidate.duration_minutes < current.duration_minutes
    }
}

/// Synthesizes a candidate for a known distance without any provider.
pub fn fallback_candidate(distance_miles: f64, options: &TravelOptions) -> TravelCandidate {
    let distance_miles = round_currency(distance_miles.max(0.0));
    let mode = fallback_mode(distance_miles, options);
    let minutes = (distance_miles / mode.speed_mph() * 60.0).ceil() as u32;

    TravelCandidate {
        mode,
        distance_miles,
        duration_minutes: minutes.max(MIN_FALLBACK_MINUTES),
        cost: mode.cost_for(distance_miles),
        steps: Vec::new(),
    }
}

fn fallback_mode(distance_miles: f64, options: &TravelOptions) -> TransportMode {
    let preferred = &options.preferred_modes;
    let walking_allowed = preferred.is_empty() || preferred.contains(&TransportMode::Walking);

    if walking_allowed && distance_miles <= options.max_walking_distance {
        return TransportMode::Walking;
    }
    match preferred
        .iter()
        .copied()
        .find(|mode| *mode != TransportMode::Walking)
    {
        Some(mode) => mode,
        None if walking_allowed && !preferred.is_empty() => TransportMode::Walking,
        None => TransportMode::Driving,
    }
}

/// Degraded-mode estimate with a pseudo-random distance. Never fails.
pub fn fallback_estimate(
    start: &str,
    end: &str,
    depart_at: ClockTime,
    options: &TravelOptions,
) -> TravelEvent {
    let distance = rand::rng().random_range(FALLBACK_MIN_MILES..=FALLBACK_MAX_MILES);
    travel_event(start, end, depart_at, fallback_candidate(distance, options))
}

pub fn travel_event(
    start: &str,
    end: &str,
    depart_at: ClockTime,
    candidate: TravelCandidate,
) -> TravelEvent {
    let needs_booking = candidate.mode == TransportMode::Transit && candidate.cost > 0.0;

    TravelEvent {
        id: uuid::Uuid::new_v4().to_string(),
        start_location: start.to_string(),
        end_location: end.to_string(),
        start_time: depart_at,
        end_time: depart_at.add_minutes(candidate.duration_minutes),
        duration: candidate.duration_minutes,
        mode: candidate.mode,
        cost: candidate.cost,
        distance: candidate.distance_miles,
        booking_required: needs_booking,
        booking_link: needs_booking
            .then(|| directions_link(start, end, candidate.mode))
            .flatten(),
        booking_advice: needs_booking.then(|| TRANSIT_BOOKING_ADVICE.to_string()),
        route_detail: (!candidate.steps.is_empty()).then_some(candidate.steps),
    }
}

fn directions_link(start: &str, end: &str, mode: TransportMode) -> Option<String> {
    Url::parse_with_params(
        DIRECTIONS_BASE,
        &[
            ("api", "1"),
            ("origin", start),
            ("destination", end),
            ("travelmode", mode.as_str()),
        ],
    )
    .ok()
    .map(String::from)
}

pub struct TravelEstimator<R> {
    routing: ProviderState<R>,
    timeout: Duration,
    metrics: Arc<AppMetrics>,
}

impl<R> TravelEstimator<R>
where
    R: RoutingProvider,
{
    pub fn new(routing: ProviderState<R>, timeout: Duration, metrics: Arc<AppMetrics>) -> Self {
        Self {
            routing,
            timeout,
            metrics,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.routing.is_connected()
    }

    /// Provider estimate when any mode resolves in time, otherwise the
    /// fallback estimate. Fails only on empty locations.
    #[instrument(skip(self, options))]
    pub async fn estimate(
        &self,
        start: &str,
        end: &str,
        depart_at: ClockTime,
        options: &TravelOptions,
    ) -> Result<TravelEvent, PlanError> {
        let (start, end) = validate_endpoints(start, end)?;

        match self.provider_candidate(start, end, options).await {
            Some(candidate) => {
                debug!(
                    mode = candidate.mode.as_str(),
                    minutes = candidate.duration_minutes,
                    "route selected"
                );
                Ok(travel_event(start, end, depart_at, candidate))
            }
            None => {
                self.metrics.inc_travel_fallback();
                Ok(fallback_estimate(start, end, depart_at, options))
            }
        }
    }

    /// Provider path only; `None` when no provider route is available.
    pub async fn estimate_with_provider(
        &self,
        start: &str,
        end: &str,
        depart_at: ClockTime,
        options: &TravelOptions,
    ) -> Option<TravelEvent> {
        let (start, end) = validate_endpoints(start, end).ok()?;
        self.provider_candidate(start, end, options)
            .await
            .map(|candidate| travel_event(start, end, depart_at, candidate))
    }

    async fn provider_candidate(
        &self,
        start: &str,
        end: &str,
        options: &TravelOptions,
    ) -> Option<TravelCandidate> {
        let client = match self.routing.client() {
            Ok(client) => client,
            Err(error) => {
                debug!(%error, "routing provider disconnected");
                return None;
            }
        };

        let requests = candidate_modes(options).into_iter().map(|mode| {
            let request = RouteRequest {
                origin: start.to_string(),
                destination: end.to_string(),
                mode,
                avoid_highways: options.avoid_highways,
                avoid_tolls: options.avoid_tolls,
            };
            async move { (mode, client.route(&request).await) }
        });

        // one future covers both outcomes, so a request resolves at most once
        let settled = match tokio::time::timeout(self.timeout, join_all(requests)).await {
            Ok(settled) => settled,
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "routing deadline elapsed"
                );
                return None;
            }
        };

        let candidates = settled
            .into_iter()
            .filter_map(|(mode, result)| match result {
                Ok(route) => Some(TravelCandidate::from_route(mode, route)),
                Err(error) => {
                    debug!(mode = mode.as_str(), %error, "routing mode failed");
                    None
                }
            })
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            warn!(start, end, "every routing mode failed");
        }
        select_best(candidates, options.max_walking_distance)
    }
}

fn validate_endpoints<'a>(start: &'a str, end: &'a str) -> Result<(&'a str, &'a str), PlanError> {
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return Err(PlanError::InvalidInput(
            "start and end locations are required".to_string(),
        ));
    }
    Ok((start, end))
}

fn candidate_modes(options: &TravelOptions) -> Vec<TransportMode> {
    let mut modes = Vec::new();
    for mode in &options.preferred_modes {
        if !modes.contains(mode) {
            modes.push(*mode);
        }
    }
    if modes.is_empty() {
        modes = TravelOptions::default().preferred_modes;
    }
    modes
}
