use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window limiter keyed by client identity.
#[derive(Debug, Clone)]
pub struct ClientRateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl ClientRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests: max_requests.max(1),
        }
    }

    /// Records a request for `client`, or returns how long until a slot frees.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Result<(), Duration> {
        let mut guard = self.inner.lock();
        let hits = guard.entry(client.to_string()).or_default();

        while hits
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() >= self.max_requests {
            let retry_after = hits
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        hits.push_back(now);
        if guard.len() > 4_096 {
            let window = self.window;
            guard.retain(|_, hits| {
                hits.back()
                    .is_some_and(|latest| now.duration_since(*latest) < window)
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_and_recovers_after_window() {
        let limiter = ClientRateLimiter::new(Duration::from_secs(10), 2);
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_ok());
        assert!(limiter.check_at("a", start + Duration::from_secs(1)).is_ok());
        let retry = limiter
            .check_at("a", start + Duration::from_secs(2))
            .unwrap_err();
        assert_eq!(retry, Duration::from_secs(8));

        assert!(limiter.check_at("b", start).is_ok());
        assert!(limiter.check_at("a", start + Duration::from_secs(10)).is_ok());
    }
}
