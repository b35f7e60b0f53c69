use dayplan_core::{
    round_currency, GeoPoint, PlaceDetails, PlaceSummary, PlacesProvider, ProviderError,
    ProviderState, Route, RouteRequest, RouteStep, RoutingProvider, TransportMode,
};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{ensure_success, transport_error};

const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
const TEXT_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";
const PHOTO_URL: &str = "https://maps.googleapis.com/maps/api/place/photo";
const DETAIL_FIELDS: &str = "place_id,name,formatted_address,rating,price_level,website,photos,types";
const METERS_PER_MILE: f64 = 1609.344;

static BLOCK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(div|br|p)[^>]*>").expect("block tag pattern"));
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space pattern"));

#[derive(Debug, Deserialize)]
struct Measure {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
    #[serde(default)]
    overview_polyline: Option<Polyline>,
}

#[derive(Debug, Deserialize)]
struct Polyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    distance: Measure,
    duration: Measure,
    #[serde(default)]
    steps: Vec<DirectionsStep>,
}

#[derive(Debug, Deserialize)]
struct DirectionsStep {
    #[serde(default)]
    html_instructions: String,
    distance: Measure,
    duration: Measure,
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<TextSearchResult>,
}

#[derive(Debug, Deserialize)]
struct TextSearchResult {
    place_id: String,
    name: String,
    #[serde(default)]
    formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    result: Option<DetailsResult>,
}

#[derive(Debug, Deserialize)]
struct DetailsResult {
    place_id: String,
    name: String,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    price_level: Option<u8>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    photos: Vec<Photo>,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    photo_reference: String,
}

/// Maps the API-level `status` field, which Google reports with HTTP 200.
fn check_api_status(status: &str, message: Option<String>) -> Result<(), ProviderError> {
    let detail = || format!("{status}: {}", message.clone().unwrap_or_default());
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "REQUEST_DENIED" => Err(ProviderError::Unauthorized(detail())),
        "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => Err(ProviderError::Unavailable(detail())),
        _ => Err(ProviderError::InvalidPayload(detail())),
    }
}

pub fn directions_mode(mode: TransportMode) -> &'static str {
    match mode {
        TransportMode::Walking => "walking",
        TransportMode::Driving => "driving",
        TransportMode::Cycling => "bicycling",
        TransportMode::Transit => "transit",
    }
}

fn meters_to_miles(meters: f64) -> f64 {
    round_currency(meters / METERS_PER_MILE)
}

fn seconds_to_minutes(seconds: f64) -> u32 {
    (seconds.max(0.0) / 60.0).ceil() as u32
}

/// Plain-text instruction from Google's HTML step markup.
pub fn strip_html(html: &str) -> String {
    let spaced = BLOCK_TAG.replace_all(html, " ");
    let bare = ANY_TAG.replace_all(&spaced, "");
    let decoded = bare
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"");
    SPACES.replace_all(decoded.trim(), " ").into_owned()
}

/// First route of a Directions payload, summed over its legs.
pub fn parse_directions(payload: &str) -> Result<Route, ProviderError> {
    let response: DirectionsResponse = serde_json::from_str(payload)
        .map_err(|error| ProviderError::InvalidPayload(error.to_string()))?;
    check_api_status(&response.status, response.error_message)?;

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidPayload("no route returned".to_string()))?;
    if route.legs.is_empty() {
        return Err(ProviderError::InvalidPayload("route has no legs".to_string()));
    }

    let meters: f64 = route.legs.iter().map(|leg| leg.distance.value).sum();
    let seconds: f64 = route.legs.iter().map(|leg| leg.duration.value).sum();
    let steps = route
        .legs
        .iter()
        .flat_map(|leg| &leg.steps)
        .map(|step| RouteStep {
            instruction: strip_html(&step.html_instructions),
            distance: meters_to_miles(step.distance.value),
            duration: seconds_to_minutes(step.duration.value),
        })
        .collect();

    Ok(Route {
        distance_miles: meters_to_miles(meters),
        duration_minutes: seconds_to_minutes(seconds),
        steps,
        encoded_path: route.overview_polyline.map(|line| line.points),
    })
}

pub fn parse_text_search(payload: &str) -> Result<Vec<PlaceSummary>, ProviderError> {
    let response: TextSearchResponse = serde_json::from_str(payload)
        .map_err(|error| ProviderError::InvalidPayload(error.to_string()))?;
    check_api_status(&response.status, response.error_message)?;

    Ok(response
        .results
        .into_iter()
        .map(|result| PlaceSummary {
            place_id: result.place_id,
            name: result.name,
            address: result.formatted_address,
        })
        .collect())
}

pub fn parse_details(payload: &str) -> Result<PlaceDetails, ProviderError> {
    let response: DetailsResponse = serde_json::from_str(payload)
        .map_err(|error| ProviderError::InvalidPayload(error.to_string()))?;
    check_api_status(&response.status, response.error_message)?;
    let result = response
        .result
        .ok_or_else(|| ProviderError::InvalidPayload("details missing result".to_string()))?;

    Ok(PlaceDetails {
        place_id: result.place_id,
        name: result.name,
        address: result.formatted_address,
        rating: result.rating,
        price_level: result.price_level,
        website: result.website,
        photo_reference: result
            .photos
            .into_iter()
            .next()
            .map(|photo| photo.photo_reference),
        types: result.types,
    })
}

async fn get_text(http: &Client, url: Url) -> Result<String, ProviderError> {
    let response = http.get(url).send().await.map_err(transport_error)?;
    ensure_success(response)
        .await?
        .text()
        .await
        .map_err(transport_error)
}

fn endpoint(base: &str, params: &[(&str, &str)]) -> Result<Url, ProviderError> {
    Url::parse_with_params(base, params)
        .map_err(|error| ProviderError::InvalidPayload(format!("bad endpoint url: {error}")))
}

#[derive(Clone)]
pub struct GoogleRoutingProvider {
    http: Client,
    api_key: String,
}

impl GoogleRoutingProvider {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }

    pub fn connect(http: Client, api_key: Option<String>) -> ProviderState<Self> {
        api_key.map(|key| Self::new(http, key)).into()
    }
}

impl RoutingProvider for GoogleRoutingProvider {
    async fn route(&self, request: &RouteRequest) -> Result<Route, ProviderError> {
        let avoid = match (request.avoid_highways, request.avoid_tolls) {
            (true, true) => Some("highways|tolls"),
            (true, false) => Some("highways"),
            (false, true) => Some("tolls"),
            (false, false) => None,
        };

        let mut params = vec![
            ("origin", request.origin.as_str()),
            ("destination", request.destination.as_str()),
            ("mode", directions_mode(request.mode)),
            ("units", "imperial"),
            ("key", self.api_key.as_str()),
        ];
        if let Some(avoid) = avoid {
            params.push(("avoid", avoid));
        }

        let body = get_text(&self.http, endpoint(DIRECTIONS_URL, &params)?).await?;
        let route = parse_directions(&body)?;
        debug!(
            mode = request.mode.as_str(),
            miles = route.distance_miles,
            minutes = route.duration_minutes,
            "directions resolved"
        );
        Ok(route)
    }
}

/// Key-free image URL from the photo endpoint's redirect.
fn photo_redirect_target(
    status: StatusCode,
    location: Option<&str>,
    api_key: &str,
) -> Result<String, ProviderError> {
    match status {
        status if status.is_redirection() => {}
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(ProviderError::Unauthorized(format!(
                "photo request rejected with status {}",
                status.as_u16()
            )));
        }
        status => {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: "photo endpoint did not redirect".to_string(),
            });
        }
    }

    let location = location.ok_or_else(|| {
        ProviderError::InvalidPayload("photo redirect without location".to_string())
    })?;
    let target = Url::parse(location)
        .map_err(|error| ProviderError::InvalidPayload(format!("bad photo location: {error}")))?;
    let carries_key = target.query_pairs().any(|(name, _)| name == "key")
        || (!api_key.is_empty() && location.contains(api_key));
    if carries_key {
        return Err(ProviderError::InvalidPayload(
            "photo location carries the api key".to_string(),
        ));
    }
    Ok(target.into())
}

#[derive(Clone)]
pub struct GooglePlacesProvider {
    http: Client,
    photo_http: Client,
    photo_endpoint: String,
    api_key: String,
}

impl GooglePlacesProvider {
    /// `photo_http` must not follow redirects; see [`crate::build_no_redirect_client`].
    pub fn new(http: Client, photo_http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            photo_http,
            photo_endpoint: PHOTO_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn connect(
        http: Client,
        photo_http: Client,
        api_key: Option<String>,
    ) -> ProviderState<Self> {
        api_key.map(|key| Self::new(http, photo_http, key)).into()
    }

    #[cfg(test)]
    fn with_photo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.photo_endpoint = endpoint.into();
        self
    }
}

impl PlacesProvider for GooglePlacesProvider {
    async fn search(
        &self,
        query: &str,
        near: GeoPoint,
        radius_meters: u32,
    ) -> Result<Vec<PlaceSummary>, ProviderError> {
        let location = format!("{},{}", near.lat, near.lng);
        let radius = radius_meters.to_string();
        let url = endpoint(
            TEXT_SEARCH_URL,
            &[
                ("query", query),
                ("location", location.as_str()),
                ("radius", radius.as_str()),
                ("key", self.api_key.as_str()),
            ],
        )?;

        let places = parse_text_search(&get_text(&self.http, url).await?)?;
        debug!(query, results = places.len(), "places search resolved");
        Ok(places)
    }

    async fn details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError> {
        let url = endpoint(
            DETAILS_URL,
            &[
                ("place_id", place_id),
                ("fields", DETAIL_FIELDS),
                ("key", self.api_key.as_str()),
            ],
        )?;
        parse_details(&get_text(&self.http, url).await?)
    }

    /// The photo endpoint needs the key, so the URL handed out is the image
    /// location it redirects to rather than the endpoint itself.
    async fn photo_url(
        &self,
        photo_reference: &str,
        max_width: u32,
    ) -> Result<String, ProviderError> {
        if photo_reference.trim().is_empty() {
            return Err(ProviderError::InvalidPayload(
                "empty photo reference".to_string(),
            ));
        }
        let width = max_width.to_string();
        let url = endpoint(
            &self.photo_endpoint,
            &[
                ("maxwidth", width.as_str()),
                ("photo_reference", photo_reference),
                ("key", self.api_key.as_str()),
            ],
        )?;

        let response = self
            .photo_http
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok());
        photo_redirect_target(response.status(), location, &self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use axum::extract::Query;
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;

    const DIRECTIONS: &str = r#"{
        "status": "OK",
        "routes": [{
            "overview_polyline": { "points": "a~l~Fjk~uOwHJy@P" },
            "legs": [{
                "distance": { "text": "0.6 mi", "value": 966 },
                "duration": { "text": "12 mins", "value": 701 },
                "steps": [
                    {
                        "html_instructions": "Head <b>north</b> on <b>Great Russell St</b><div style=\"font-size:0.9em\">Destination will be on the right</div>",
                        "distance": { "value": 402 },
                        "duration": { "value": 290 }
                    },
                    {
                        "html_instructions": "Turn <b>left</b> onto Museum St",
                        "distance": { "value": 564 },
                        "duration": { "value": 411 }
                    }
                ]
            }]
        }]
    }"#;

    #[test]
    fn directions_convert_units_and_strip_markup() {
        let route = parse_directions(DIRECTIONS).unwrap();
        assert_eq!(route.distance_miles, 0.6);
        assert_eq!(route.duration_minutes, 12);
        assert_eq!(route.encoded_path.as_deref(), Some("a~l~Fjk~uOwHJy@P"));
        assert_eq!(route.steps.len(), 2);
        assert_eq!(
            route.steps[0].instruction,
            "Head north on Great Russell St Destination will be on the right"
        );
        assert_eq!(route.steps[1].duration, 7);
    }

    #[test]
    fn request_denied_is_an_auth_failure() {
        let error = parse_directions(
            r#"{"status": "REQUEST_DENIED", "error_message": "The provided API key is invalid."}"#,
        )
        .unwrap_err();
        assert!(error.is_auth());
    }

    #[test]
    fn zero_results_mean_no_route_but_empty_search() {
        assert!(matches!(
            parse_directions(r#"{"status": "ZERO_RESULTS", "routes": []}"#),
            Err(ProviderError::InvalidPayload(_))
        ));
        assert!(parse_text_search(r#"{"status": "ZERO_RESULTS", "results": []}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn details_take_first_photo() {
        let details = parse_details(
            r#"{
                "status": "OK",
                "result": {
                    "place_id": "abc",
                    "name": "Borough Market",
                    "formatted_address": "8 Southwark St, London SE1 1TL",
                    "rating": 4.5,
                    "price_level": 2,
                    "photos": [{ "photo_reference": "p1" }, { "photo_reference": "p2" }],
                    "types": ["food", "point_of_interest"]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(details.photo_reference.as_deref(), Some("p1"));
        assert_eq!(details.price_level, Some(2));
        assert!(details.website.is_none());
    }

    #[test]
    fn cycling_uses_bicycling_mode() {
        assert_eq!(directions_mode(TransportMode::Cycling), "bicycling");
        assert_eq!(strip_html("Fish &amp; chips&nbsp;here"), "Fish & chips here");
    }

    const MAPS_KEY: &str = "SECRET-MAPS-KEY";
    const IMAGE_URL: &str = "https://lh3.googleusercontent.com/places/photo-abc=s1600-w800";

    async fn photo_server() -> String {
        let app = Router::new().route(
            "/photo",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let authorized = params.get("key").map(String::as_str) == Some(MAPS_KEY);
                let sized = params.get("maxwidth").map(String::as_str) == Some("800");
                if authorized && sized && params.contains_key("photo_reference") {
                    (StatusCode::FOUND, [(header::LOCATION, IMAGE_URL)]).into_response()
                } else {
                    StatusCode::FORBIDDEN.into_response()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}/photo")
    }

    fn local_client() -> Client {
        Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn photo_url_resolves_to_key_free_image_location() {
        let endpoint = photo_server().await;
        let places = GooglePlacesProvider::new(local_client(), local_client(), MAPS_KEY)
            .with_photo_endpoint(endpoint);

        let url = places.photo_url("ref 1", 800).await.unwrap();
        assert_eq!(url, IMAGE_URL);
        assert!(!url.contains(MAPS_KEY));
        assert!(places.photo_url(" ", 800).await.is_err());

        let rejected = GooglePlacesProvider::new(local_client(), local_client(), "wrong-key")
            .with_photo_endpoint(places.photo_endpoint.clone());
        assert!(rejected.photo_url("ref 1", 800).await.unwrap_err().is_auth());
    }

    #[test]
    fn photo_redirect_must_not_carry_the_key() {
        let leaked = format!("https://maps.googleapis.com/photo?key={MAPS_KEY}");
        assert!(matches!(
            photo_redirect_target(StatusCode::FOUND, Some(&leaked), MAPS_KEY),
            Err(ProviderError::InvalidPayload(_))
        ));
        assert!(matches!(
            photo_redirect_target(StatusCode::FOUND, None, MAPS_KEY),
            Err(ProviderError::InvalidPayload(_))
        ));
        assert!(matches!(
            photo_redirect_target(StatusCode::OK, Some(IMAGE_URL), MAPS_KEY),
            Err(ProviderError::Status { status: 200, .. })
        ));
        assert_eq!(
            photo_redirect_target(StatusCode::FOUND, Some(IMAGE_URL), MAPS_KEY).unwrap(),
            IMAGE_URL
        );
    }
}
