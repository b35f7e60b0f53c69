use std::sync::Arc;
use std::time::Duration;

use dayplan_core::{
    ActivityEvent, ClockTime, Itinerary, ItineraryEvent, RoutingProvider, TravelEvent,
    TravelOptions,
};
use dayplan_observability::AppMetrics;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::travel::{fallback_estimate, TravelEstimator};

/// Drift between an estimated arrival and the next activity that triggers a fit.
pub const RECONCILE_TOLERANCE_MINUTES: u32 = 5;

/// Stretches or tightens `travel` to exactly span `prev_end..next_start`.
/// Returns whether the segment was changed. Non-positive gaps are left alone.
pub fn fit_to_gap(travel: &mut TravelEvent, prev_end: ClockTime, next_start: ClockTime) -> bool {
    let gap = prev_end.signed_gap(next_start);
    let drift = travel.end_time.signed_gap(next_start).unsigned_abs();

    if drift < RECONCILE_TOLERANCE_MINUTES || gap <= 0 {
        return false;
    }
    travel.duration = gap as u32;
    travel.end_time = next_start;
    true
}

#[derive(Debug, Clone, Copy)]
pub struct EnhanceSettings {
    pub batch_size: usize,
    pub pause: Duration,
}

impl Default for EnhanceSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            pause: Duration::from_millis(500),
        }
    }
}

pub struct Reconciler<R> {
    estimator: TravelEstimator<R>,
    enhance: EnhanceSettings,
    metrics: Arc<AppMetrics>,
}

impl<R> Reconciler<R>
where
    R: RoutingProvider,
{
    pub fn new(
        estimator: TravelEstimator<R>,
        enhance: EnhanceSettings,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            estimator,
            enhance: EnhanceSettings {
                batch_size: enhance.batch_size.max(1),
                ..enhance
            },
            metrics,
        }
    }

    pub fn estimator(&self) -> &TravelEstimator<R> {
        &self.estimator
    }

    /// One travel event per adjacent pair, estimated in order.
    #[instrument(skip_all, fields(activities = activities.len()))]
    pub async fn reconcile(
        &self,
        activities: &[ActivityEvent],
        options: &TravelOptions,
    ) -> Vec<TravelEvent> {
        let mut travels = Vec::with_capacity(activities.len().saturating_sub(1));

        for pair in activities.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let mut travel = match self
                .estimator
                .estimate(&from.location, &to.location, from.end_time, options)
                .await
            {
                Ok(travel) => travel,
                Err(error) => {
                    warn!(
                        from = %from.name,
                        to = %to.name,
                        %error,
                        "segment estimate failed, using fallback"
                    );
                    self.metrics.inc_travel_fallback();
                    fallback_estimate(&from.location, &to.location, from.end_time, options)
                }
            };

            self.fit(&mut travel, from.end_time, to.start_time);
            travels.push(travel);
        }

        travels
    }

    /// Re-estimates every travel segment through the routing provider in
    /// throttled batches. Segments the provider can't improve are kept.
    #[instrument(skip_all, fields(itinerary = %itinerary.id))]
    pub async fn enhance(&self, mut itinerary: Itinerary, options: &TravelOptions) -> Itinerary {
        let jobs = enhance_jobs(&itinerary);
        let batches = jobs.chunks(self.enhance.batch_size).collect::<Vec<_>>();
        let mut improved = 0usize;

        for (batch_index, batch) in batches.iter().enumerate() {
            let estimates = join_all(batch.iter().map(|job| {
                self.estimator.estimate_with_provider(
                    &job.from_location,
                    &job.to_location,
                    job.prev_end,
                    options,
                )
            }))
            .await;

            for (job, estimate) in batch.iter().zip(estimates) {
                let ItineraryEvent::Travel(current) = &mut itinerary.events[job.index] else {
                    continue;
                };
                if let Some(mut fresh) = estimate {
                    fresh.id = current.id.clone();
                    *current = fresh;
                    improved += 1;
                } else {
                    debug!(segment = %current.id, "provider estimate unavailable, keeping segment");
                }
                self.fit(current, job.prev_end, job.next_start);
            }

            if batch_index + 1 < batches.len() && !self.enhance.pause.is_zero() {
                tokio::time::sleep(self.enhance.pause).await;
            }
        }

        itinerary.recompute_totals();
        info!(segments = jobs.len(), improved, "itinerary enhanced");
        itinerary
    }

    fn fit(&self, travel: &mut TravelEvent, prev_end: ClockTime, next_start: ClockTime) {
        if fit_to_gap(travel, prev_end, next_start) {
            debug!(segment = %travel.id, duration = travel.duration, "segment fitted to gap");
            self.metrics.inc_segment_corrected();
        }
    }
}

struct EnhanceJob {
    index: usize,
    from_location: String,
    to_location: String,
    prev_end: ClockTime,
    next_start: ClockTime,
}

fn enhance_jobs(itinerary: &Itinerary) -> Vec<EnhanceJob> {
    let events = &itinerary.events;
    (1..events.len().saturating_sub(1))
        .filter_map(|index| match (&events[index - 1], &events[index], &events[index + 1]) {
            (
                ItineraryEvent::Activity(from),
                ItineraryEvent::Travel(_),
                ItineraryEvent::Activity(to),
            ) => Some(EnhanceJob {
                index,
                from_location: from.location.clone(),
                to_location: to.location.clone(),
                prev_end: from.end_time,
                next_start: to.start_time,
            }),
            _ => None,
        })
        .collect()
}
