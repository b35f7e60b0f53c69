pub mod config;
pub mod generation;
pub mod reconcile;
pub mod resolver;
pub mod travel;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use dayplan_core::{
    build_day_prompt, draft_activities, fallback_day_activities, validate_request,
    ActivityEvent, ActivitySuggestion, ClockTime, DayPlanRequest, GeoPoint, Itinerary,
    PlanError, PlacesProvider, ProviderState, RoutingProvider, TextGenerator,
    TravelEvent, TravelOptions,
};
use dayplan_observability::AppMetrics;
use tracing::{info, instrument, warn};

pub use config::PlannerConfig;
pub use generation::{parse_structured, AttemptFailure, GenerationRetrier, RetryPolicy};
pub use reconcile::{fit_to_gap, EnhanceSettings, Reconciler, RECONCILE_TOLERANCE_MINUTES};
pub use resolver::{fallback_activity, price_tier_cost, ActivityResolver};
pub use travel::{fallback_estimate, select_best, TravelCandidate, TravelEstimator};

/// End-to-end day planning over the three provider seams.
pub struct DayPlanner<G, R, P> {
    config: PlannerConfig,
    retrier: GenerationRetrier<G>,
    reconciler: Reconciler<R>,
    resolver: ActivityResolver<P>,
    metrics: Arc<AppMetrics>,
}

impl<G, R, P> DayPlanner<G, R, P>
where
    G: TextGenerator,
    R: RoutingProvider,
    P: PlacesProvider,
{
    pub fn new(
        config: PlannerConfig,
        generator: G,
        routing: ProviderState<R>,
        places: ProviderState<P>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let retrier = GenerationRetrier::new(
            generator,
            RetryPolicy {
                max_attempts: config.max_attempts,
                backoff: config.retry_backoff,
            },
            metrics.clone(),
        );
        let estimator = TravelEstimator::new(routing, config.routing_timeout, metrics.clone());
        let reconciler = Reconciler::new(
            estimator,
            EnhanceSettings {
                batch_size: config.enhance_batch_size,
                pause: config.enhance_pause,
            },
            metrics.clone(),
        );
        let resolver =
            ActivityResolver::new(places, config.places_radius_meters, metrics.clone());

        Self {
            config,
            retrier,
            reconciler,
            resolver,
            metrics,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn routing_connected(&self) -> bool {
        self.reconciler.estimator().is_connected()
    }

    /// Travel options with the configured walking limit.
    pub fn default_travel_options(&self) -> TravelOptions {
        TravelOptions {
            max_walking_distance: self.config.max_walking_miles,
            ..TravelOptions::default()
        }
    }

    #[instrument(skip_all, fields(location = %request.location))]
    pub async fn plan_day(&self, request: &DayPlanRequest) -> Result<Itinerary, PlanError> {
        validate_request(request)?;
        let options = request
            .travel
            .clone()
            .unwrap_or_else(|| self.default_travel_options());

        let (activities, degraded) = match self.draft_day(request).await {
            Ok(activities) => (activities, false),
            Err(error @ (PlanError::GenerationExhausted { .. } | PlanError::MalformedResponse(_)))
                if self.config.static_fallback =>
            {
                warn!(%error, "generation failed, serving the static day");
                self.metrics.inc_degraded_plan();
                (fallback_day_activities(request), true)
            }
            Err(error) => return Err(error),
        };

        let travels = self.reconciler.reconcile(&activities, &options).await;
        let mut itinerary = Itinerary::assemble(request.location.trim(), activities, travels);
        itinerary.degraded = degraded;

        info!(
            itinerary = %itinerary.id,
            events = itinerary.events.len(),
            total_cost = itinerary.total_cost,
            degraded,
            "day planned"
        );
        Ok(itinerary)
    }

    async fn draft_day(&self, request: &DayPlanRequest) -> Result<Vec<ActivityEvent>, PlanError> {
        let draft = self.retrier.generate(&build_day_prompt(request)).await?;
        draft_activities(&draft)
    }

    pub async fn estimate_travel(
        &self,
        start: &str,
        end: &str,
        depart_at: ClockTime,
        options: Option<TravelOptions>,
    ) -> Result<TravelEvent, PlanError> {
        let options = options.unwrap_or_else(|| self.default_travel_options());
        self.reconciler
            .estimator()
            .estimate(start, end, depart_at, &options)
            .await
    }

    pub async fn reconcile(
        &self,
        activities: &[ActivityEvent],
        options: Option<TravelOptions>,
    ) -> Result<Vec<TravelEvent>, PlanError> {
        if activities.is_empty() {
            return Err(PlanError::InvalidInput(
                "at least one activity is required".to_string(),
            ));
        }
        let options = options.unwrap_or_else(|| self.default_travel_options());
        Ok(self.reconciler.reconcile(activities, &options).await)
    }

    pub async fn enhance(&self, itinerary: Itinerary, options: Option<TravelOptions>) -> Itinerary {
        let options = options.unwrap_or_else(|| self.default_travel_options());
        self.reconciler.enhance(itinerary, &options).await
    }

    pub async fn resolve(&self, suggestion: &ActivitySuggestion, near: GeoPoint) -> ActivityEvent {
        self.resolver.resolve(suggestion, near).await
    }

    pub async fn resolve_all(
        &self,
        suggestions: &[ActivitySuggestion],
        near: GeoPoint,
    ) -> Vec<ActivityEvent> {
        self.resolver.resolve_all(suggestions, near).await
    }
}
