use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use dayplan_api::{build_app_with, ApiSettings};
use dayplan_planner::PlannerConfig;
use dayplan_providers::ProviderCredentials;
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "test-dayplan-key";

fn settings() -> ApiSettings {
    ApiSettings {
        api_key: API_KEY.to_string(),
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max: 100,
        planner: PlannerConfig {
            retry_backoff: Duration::ZERO,
            enhance_pause: Duration::ZERO,
            ..PlannerConfig::default()
        },
        credentials: ProviderCredentials::default(),
    }
}

async fn app() -> Router {
    build_app_with(settings()).await.expect("app should build")
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, parsed)
}

fn activity(location: &str, start: &str, end: &str, duration: u32) -> Value {
    json!({
        "id": location.to_lowercase(),
        "name": location,
        "description": "",
        "location": location,
        "startTime": start,
        "endTime": end,
        "duration": duration,
        "cost": 10.0,
        "activityType": ["sightseeing"],
        "address": "",
        "bookingRequired": false
    })
}

#[tokio::test]
async fn health_is_public() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app().await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["capabilities"]["routing"], false);
    assert!(body["metrics"].get("travel_fallback_total").is_some());
}

#[tokio::test]
async fn plan_day_requires_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/plan_day")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "location": "Lisbon", "preferences": ["food"] }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(app().await, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn plan_day_without_generation_key_is_an_auth_failure() {
    let (status, body) = send(
        app().await,
        post(
            "/v1/plan_day",
            json!({ "location": "Lisbon", "preferences": ["food", "views"] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "authentication_failure");
    assert!(body["details"].as_str().unwrap().contains("DAYPLAN_OPENAI_API_KEY"));
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn plan_day_rejects_missing_preferences() {
    let (status, body) = send(
        app().await,
        post("/v1/plan_day", json!({ "location": "Lisbon", "preferences": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn malformed_body_is_invalid_input() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/plan_day")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from("{\"location\": "))
        .unwrap();
    let (status, body) = send(app().await, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn travel_estimate_falls_back_without_maps_key() {
    let (status, body) = send(
        app().await,
        post(
            "/v1/travel/estimate",
            json!({
                "startLocation": "Alfama",
                "endLocation": "Belem Tower",
                "startTime": "10:00"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["startTime"], "10:00");
    assert!(body["duration"].as_u64().unwrap() >= 5);
    assert!(body.get("routeDetail").is_none());
}

#[tokio::test]
async fn travel_estimate_requires_locations_and_time() {
    let (status, body) = send(
        app().await,
        post(
            "/v1/travel/estimate",
            json!({ "startLocation": "", "endLocation": "Belem", "startTime": "10:00" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, _) = send(
        app().await,
        post(
            "/v1/travel/estimate",
            json!({ "startLocation": "Alfama", "endLocation": "Belem", "startTime": "25:99" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reconcile_fits_fallback_segments_to_gaps() {
    let (status, body) = send(
        app().await,
        post(
            "/v1/itinerary/reconcile",
            json!({
                "activities": [
                    activity("Museum", "09:00", "10:00", 60),
                    activity("Cafe", "12:00", "13:00", 60)
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let segments = body["travelEvents"].as_array().unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0]["startTime"], "10:00");
    assert_eq!(segments[0]["endTime"], "12:00");
    assert_eq!(segments[0]["duration"], 120);
}

#[tokio::test]
async fn enhance_keeps_segments_without_provider() {
    let mut events = vec![activity("Museum", "09:00", "10:00", 60)];
    events[0]["type"] = json!("activity");
    events.push(json!({
        "type": "travel",
        "id": "seg-1",
        "startLocation": "Museum",
        "endLocation": "Cafe",
        "startTime": "10:00",
        "endTime": "10:12",
        "duration": 12,
        "mode": "driving",
        "cost": 1.5,
        "distance": 3.0,
        "bookingRequired": false
    }));
    let mut cafe = activity("Cafe", "10:15", "11:00", 45);
    cafe["type"] = json!("activity");
    events.push(cafe);

    let (status, body) = send(
        app().await,
        post(
            "/v1/itinerary/enhance",
            json!({
                "itinerary": {
                    "id": "day-1",
                    "location": "Lisbon",
                    "events": events,
                    "totalCost": 0.0,
                    "totalDuration": 0
                }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "day-1");
    assert_eq!(body["events"][1]["id"], "seg-1");
    assert_eq!(body["events"][1]["duration"], 12);
    assert_eq!(body["totalCost"], 21.5);
    assert_eq!(body["totalDuration"], 60 + 12 + 45);
}

#[tokio::test]
async fn resolve_without_places_key_uses_suggestion_text() {
    let (status, body) = send(
        app().await,
        post(
            "/v1/activities/resolve",
            json!({
                "near": { "lat": 38.7223, "lng": -9.1393 },
                "suggestions": [{
                    "name": "Tile museum",
                    "searchQuery": "Museu Nacional do Azulejo",
                    "estimatedCost": 5.0,
                    "durationMinutes": 90
                }]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let resolved = &body["activities"][0];
    assert_eq!(resolved["name"], "Museu Nacional do Azulejo");
    assert_eq!(resolved["location"], "Museu Nacional do Azulejo");
    assert_eq!(resolved["cost"], 5.0);
    assert_eq!(resolved["duration"], 90);
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let app = build_app_with(ApiSettings {
        rate_limit_max: 2,
        ..settings()
    })
    .await
    .unwrap();

    let estimate = || {
        let mut request = post(
            "/v1/travel/estimate",
            json!({ "startLocation": "A", "endLocation": "B", "startTime": "09:00" }),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", "198.51.100.4".parse().unwrap());
        request
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(estimate()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(estimate()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());

    let other = post(
        "/v1/travel/estimate",
        json!({ "startLocation": "A", "endLocation": "B", "startTime": "09:00" }),
    );
    let response = app.oneshot(other).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
