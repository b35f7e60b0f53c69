pub mod clock;
pub mod draft;
pub mod error;
pub mod models;
pub mod planner;
pub mod providers;
pub mod sanitize;

pub use clock::ClockTime;
pub use draft::draft_activities;
pub use error::{ErrorBody, PlanError, ProviderError};
pub use models::*;
pub use planner::{build_day_prompt, fallback_day_activities, validate_request};
pub use providers::{
    PlaceDetails, PlaceSummary, PlacesProvider, ProviderState, Route, RouteRequest,
    RoutingProvider, TextGenerator,
};
pub use sanitize::sanitize;
