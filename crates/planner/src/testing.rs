use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dayplan_core::{
    GeoPoint, PlaceDetails, PlaceSummary, PlacesProvider, ProviderError, Route, RouteRequest,
    RoutingProvider, TextGenerator, TransportMode,
};
use parking_lot::Mutex;

type Reply = Result<String, ProviderError>;

#[derive(Clone)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<VecDeque<Reply>>>,
    repeat: Option<Reply>,
    calls: Arc<AtomicU32>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            repeat: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn repeating(reply: Reply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        next.or_else(|| self.repeat.clone())
            .unwrap_or_else(|| Err(ProviderError::Unavailable("script exhausted".to_string())))
    }
}

#[derive(Clone, Default)]
pub struct StubRouter {
    routes: HashMap<TransportMode, Route>,
    delay: Option<Duration>,
    calls: Arc<AtomicU32>,
    in_flight: Arc<AtomicU32>,
    peak_in_flight: Arc<AtomicU32>,
}

impl StubRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, mode: TransportMode, distance_miles: f64, minutes: u32) -> Self {
        self.routes.insert(
            mode,
            Route {
                distance_miles,
                duration_minutes: minutes,
                steps: Vec::new(),
                encoded_path: None,
            },
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of route requests that were pending at once.
    pub fn peak_in_flight(&self) -> u32 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for StubRouter {
    async fn route(&self, request: &RouteRequest) -> Result<Route, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(pending, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.routes
            .get(&request.mode)
            .cloned()
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                body: format!("no {} route", request.mode.as_str()),
            })
    }
}

#[derive(Clone, Default)]
pub struct StubPlaces {
    pub results: Vec<PlaceSummary>,
    pub details: Option<PlaceDetails>,
    pub fail_search: bool,
    pub fail_photo: bool,
}

impl PlacesProvider for StubPlaces {
    async fn search(
        &self,
        _query: &str,
        _near: GeoPoint,
        _radius_meters: u32,
    ) -> Result<Vec<PlaceSummary>, ProviderError> {
        if self.fail_search {
            return Err(ProviderError::Unavailable("places down".to_string()));
        }
        Ok(self.results.clone())
    }

    async fn details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError> {
        self.details
            .clone()
            .filter(|details| details.place_id == place_id)
            .ok_or_else(|| ProviderError::InvalidPayload(format!("unknown place {place_id}")))
    }

    async fn photo_url(
        &self,
        photo_reference: &str,
        max_width: u32,
    ) -> Result<String, ProviderError> {
        if self.fail_photo {
            return Err(ProviderError::Unavailable("photo service down".to_string()));
        }
        Ok(format!(
            "https://photos.example/{photo_reference}?w={max_width}"
        ))
    }
}
