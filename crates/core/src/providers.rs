//! Seams to the external text-generation, routing and places providers.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::models::{GeoPoint, RouteStep, TransportMode};

pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: String,
    pub destination: String,
    pub mode: TransportMode,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub distance_miles: f64,
    pub duration_minutes: u32,
    pub steps: Vec<RouteStep>,
    pub encoded_path: Option<String>,
}

pub trait RoutingProvider: Send + Sync {
    async fn route(&self, request: &RouteRequest) -> Result<Route, ProviderError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceDetails {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<f32>,
    pub price_level: Option<u8>,
    pub website: Option<String>,
    pub photo_reference: Option<String>,
    pub types: Vec<String>,
}

pub trait PlacesProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        near: GeoPoint,
        radius_meters: u32,
    ) -> Result<Vec<PlaceSummary>, ProviderError>;

    async fn details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError>;

    async fn photo_url(&self, photo_reference: &str, max_width: u32)
        -> Result<String, ProviderError>;
}

/// Connection state of a provider client handle.
#[derive(Debug, Clone)]
pub enum ProviderState<P> {
    Connected(P),
    Disconnected { reason: String },
}

impl<P> ProviderState<P> {
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    pub fn client(&self) -> Result<&P, ProviderError> {
        match self {
            Self::Connected(client) => Ok(client),
            Self::Disconnected { reason } => Err(ProviderError::Unavailable(reason.clone())),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl<P> From<Option<P>> for ProviderState<P> {
    fn from(client: Option<P>) -> Self {
        match client {
            Some(client) => Self::Connected(client),
            None => Self::disconnected("provider credentials are not configured"),
        }
    }
}
