use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    generation_attempts_total: AtomicU64,
    generation_failures_total: AtomicU64,
    degraded_plans_total: AtomicU64,
    travel_fallback_total: AtomicU64,
    places_fallback_total: AtomicU64,
    segments_corrected_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub generation_attempts_total: u64,
    pub generation_failures_total: u64,
    pub degraded_plans_total: u64,
    pub travel_fallback_total: u64,
    pub places_fallback_total: u64,
    pub segments_corrected_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_generation_attempt(&self) {
        self.generation_attempts_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_generation_failure(&self) {
        self.generation_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_degraded_plan(&self) {
        self.degraded_plans_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_travel_fallback(&self) {
        self.travel_fallback_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_places_fallback(&self) {
        self.places_fallback_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_segment_corrected(&self) {
        self.segments_corrected_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            generation_attempts_total: self.generation_attempts_total.load(Ordering::Relaxed),
            generation_failures_total: self.generation_failures_total.load(Ordering::Relaxed),
            degraded_plans_total: self.degraded_plans_total.load(Ordering::Relaxed),
            travel_fallback_total: self.travel_fallback_total.load(Ordering::Relaxed),
            places_fallback_total: self.places_fallback_total.load(Ordering::Relaxed),
            segments_corrected_total: self.segments_corrected_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,dayplan_api=info,dayplan_planner=info,dayplan_providers=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
