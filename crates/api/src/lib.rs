mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use dayplan_core::{
    ActivityEvent, ActivitySuggestion, ClockTime, DayPlanRequest, ErrorBody, GeoPoint, Itinerary,
    PlanError, TravelEvent, TravelOptions,
};
use dayplan_observability::{AppMetrics, MetricsSnapshot};
use dayplan_planner::{DayPlanner, PlannerConfig};
use dayplan_providers::{
    build_http_client, build_no_redirect_client, GooglePlacesProvider, GoogleRoutingProvider,
    OpenAiTextGenerator, ProviderCredentials,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use crate::rate_limit::ClientRateLimiter;

const MAX_BODY_BYTES: usize = 256 * 1024;
const MAX_RESOLVE_SUGGESTIONS: usize = 20;

pub type Planner = DayPlanner<OpenAiTextGenerator, GoogleRoutingProvider, GooglePlacesProvider>;

/// Process settings for the HTTP service.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub api_key: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub planner: PlannerConfig,
    pub credentials: ProviderCredentials,
}

impl ApiSettings {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("DAYPLAN_API_KEY").unwrap_or_else(|_| "dev-dayplan-key".to_string()),
            rate_limit_window: Duration::from_secs(
                env::var("DAYPLAN_RATE_LIMIT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60),
            ),
            rate_limit_max: env::var("DAYPLAN_RATE_LIMIT_MAX")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(60),
            planner: PlannerConfig::from_env(),
            credentials: ProviderCredentials::from_env(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct Capabilities {
    text_generation: bool,
    routing: bool,
    places: bool,
}

#[derive(Clone)]
pub struct ApiState {
    pub planner: Arc<Planner>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: ClientRateLimiter,
    capabilities: Capabilities,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: MetricsSnapshot,
    capabilities: Capabilities,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TravelEstimateRequest {
    #[serde(default)]
    start_location: String,
    #[serde(default)]
    end_location: String,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    options: Option<TravelOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileRequest {
    activities: Vec<ActivityEvent>,
    #[serde(default)]
    options: Option<TravelOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileResponse {
    travel_events: Vec<TravelEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhanceRequest {
    itinerary: Itinerary,
    #[serde(default)]
    options: Option<TravelOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    suggestions: Vec<ActivitySuggestion>,
    near: GeoPoint,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    activities: Vec<ActivityEvent>,
}

/// A [`PlanError`] rendered as `{ error, details, timestamp }`.
#[derive(Debug)]
pub struct ApiError(pub PlanError);

impl From<PlanError> for ApiError {
    fn from(error: PlanError) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PlanError::InvalidInput(rejection.body_text()))
    }
}

pub fn status_for(error: &PlanError) -> StatusCode {
    match error {
        PlanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PlanError::MalformedResponse(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PlanError::GenerationExhausted { .. } => StatusCode::BAD_GATEWAY,
        PlanError::AuthenticationFailure(_) | PlanError::ProviderUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

pub async fn build_app() -> Result<Router> {
    build_app_with(ApiSettings::from_env()).await
}

pub async fn build_app_with(settings: ApiSettings) -> Result<Router> {
    let metrics = AppMetrics::shared();
    let http = build_http_client().context("failed to build HTTP client")?;
    let credentials = settings.credentials;

    let generator = OpenAiTextGenerator::new(
        http.clone(),
        credentials.openai_api_key.clone(),
        credentials.openai_model.clone(),
    );
    let routing = GoogleRoutingProvider::connect(http.clone(), credentials.maps_api_key.clone());
    let photo_http = build_no_redirect_client().context("failed to build photo HTTP client")?;
    let places =
        GooglePlacesProvider::connect(http, photo_http, credentials.maps_api_key.clone());

    let capabilities = Capabilities {
        text_generation: generator.is_configured(),
        routing: routing.is_connected(),
        places: places.is_connected(),
    };
    if !capabilities.routing {
        warn!("DAYPLAN_MAPS_API_KEY not set; travel and places use fallback estimates");
    }

    let planner = DayPlanner::new(settings.planner, generator, routing, places, metrics.clone());
    let state = ApiState {
        planner: Arc::new(planner),
        metrics,
        api_key: settings.api_key,
        limiter: ClientRateLimiter::new(settings.rate_limit_window, settings.rate_limit_max),
        capabilities,
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/plan_day", post(plan_day))
        .route("/v1/travel/estimate", post(travel_estimate))
        .route("/v1/itinerary/reconcile", post(itinerary_reconcile))
        .route("/v1/itinerary/enhance", post(itinerary_enhance))
        .route("/v1/activities/resolve", post(activities_resolve))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: state.capabilities,
    };
    (StatusCode::OK, Json(payload))
}

async fn plan_day(
    State(state): State<ApiState>,
    payload: Result<Json<DayPlanRequest>, JsonRejection>,
) -> Result<Json<Itinerary>, ApiError> {
    let Json(request) = payload?;
    let itinerary = state.planner.plan_day(&request).await?;
    Ok(Json(itinerary))
}

async fn travel_estimate(
    State(state): State<ApiState>,
    payload: Result<Json<TravelEstimateRequest>, JsonRejection>,
) -> Result<Json<TravelEvent>, ApiError> {
    let Json(request) = payload?;
    let depart_at: ClockTime = request
        .start_time
        .as_deref()
        .ok_or_else(|| PlanError::InvalidInput("startTime is required".to_string()))?
        .parse()?;

    let travel = state
        .planner
        .estimate_travel(
            &request.start_location,
            &request.end_location,
            depart_at,
            request.options,
        )
        .await?;
    Ok(Json(travel))
}

async fn itinerary_reconcile(
    State(state): State<ApiState>,
    payload: Result<Json<ReconcileRequest>, JsonRejection>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let Json(request) = payload?;
    let travel_events = state
        .planner
        .reconcile(&request.activities, request.options)
        .await?;
    Ok(Json(ReconcileResponse { travel_events }))
}

async fn itinerary_enhance(
    State(state): State<ApiState>,
    payload: Result<Json<EnhanceRequest>, JsonRejection>,
) -> Result<Json<Itinerary>, ApiError> {
    let Json(request) = payload?;
    let itinerary = state
        .planner
        .enhance(request.itinerary, request.options)
        .await;
    Ok(Json(itinerary))
}

async fn activities_resolve(
    State(state): State<ApiState>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let Json(request) = payload?;
    if request.suggestions.is_empty() || request.suggestions.len() > MAX_RESOLVE_SUGGESTIONS {
        return Err(PlanError::InvalidInput(format!(
            "between 1 and {MAX_RESOLVE_SUGGESTIONS} suggestions are required"
        ))
        .into());
    }

    let activities = state
        .planner
        .resolve_all(&request.suggestions, request.near)
        .await;
    Ok(Json(ResolveResponse { activities }))
}

async fn metrics_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state.metrics.inc_request();
    state.metrics.observe_latency(started.elapsed());
    response
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if header_key != state.api_key {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("unauthorized", "missing or invalid x-api-key")),
        )
            .into_response();
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let client = client_key(&request);
    if let Err(retry_after) = state.limiter.check(&client) {
        let seconds = retry_after.as_secs().max(1);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody::new(
                "rate_limited",
                format!("rate limit exceeded, retry in {seconds}s"),
            )),
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(request).await
}

fn is_public_endpoint(path: &str) -> bool {
    path == "/health"
}

/// First `x-forwarded-for` hop, or `local` for direct connections.
fn client_key(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("local")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        let cases = [
            (PlanError::InvalidInput(String::new()), StatusCode::BAD_REQUEST),
            (
                PlanError::MalformedResponse(String::new()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                PlanError::GenerationExhausted {
                    attempts: 3,
                    reason: String::new(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                PlanError::AuthenticationFailure(String::new()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PlanError::ProviderUnavailable(String::new()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(status_for(&error), status, "{}", error.code());
        }
    }

    #[test]
    fn client_key_uses_first_forwarded_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.7");

        let direct = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&direct), "local");
    }
}
