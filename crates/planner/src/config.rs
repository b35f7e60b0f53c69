use std::env;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PlannerConfig {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub routing_timeout: Duration,
    pub max_walking_miles: f64,
    pub places_radius_meters: u32,
    pub enhance_batch_size: usize,
    pub enhance_pause: Duration,
    pub static_fallback: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            routing_timeout: Duration::from_secs(5),
            max_walking_miles: 1.5,
            places_radius_meters: 5_000,
            enhance_batch_size: 3,
            enhance_pause: Duration::from_millis(500),
            static_fallback: true,
        }
    }
}

impl PlannerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_attempts: env_parse("DAYPLAN_MAX_ATTEMPTS")
                .filter(|value: &u32| *value > 0)
                .unwrap_or(defaults.max_attempts),
            retry_backoff: env_parse("DAYPLAN_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            routing_timeout: env_parse("DAYPLAN_ROUTING_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.routing_timeout),
            max_walking_miles: env_parse("DAYPLAN_MAX_WALKING_MILES")
                .filter(|value: &f64| value.is_finite() && *value >= 0.0)
                .unwrap_or(defaults.max_walking_miles),
            places_radius_meters: env_parse("DAYPLAN_PLACES_RADIUS_METERS")
                .unwrap_or(defaults.places_radius_meters),
            enhance_batch_size: env_parse("DAYPLAN_ENHANCE_BATCH_SIZE")
                .filter(|value: &usize| *value > 0)
                .unwrap_or(defaults.enhance_batch_size),
            enhance_pause: env_parse("DAYPLAN_ENHANCE_PAUSE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.enhance_pause),
            static_fallback: env_parse("DAYPLAN_STATIC_FALLBACK")
                .unwrap_or(defaults.static_fallback),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}
