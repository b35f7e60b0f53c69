//! HTTP clients for the text-generation, routing and places seams.

mod google;
mod openai;

use std::env;
use std::time::Duration;

use dayplan_core::ProviderError;
use reqwest::{Client, Response, StatusCode};

pub use google::{
    directions_mode, parse_details, parse_directions, parse_text_search, strip_html,
    GooglePlacesProvider, GoogleRoutingProvider,
};
pub use openai::{extract_output_text, OpenAiTextGenerator, DEFAULT_OPENAI_MODEL};

pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(6))
        .timeout(Duration::from_secs(20))
        .build()
}

/// Client that reports redirects instead of following them, for endpoints
/// whose `Location` header is the useful part of the answer.
pub fn build_no_redirect_client() -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(6))
        .timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Credentials for the concrete providers, read from `DAYPLAN_*` variables.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub maps_api_key: Option<String>,
}

impl ProviderCredentials {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_empty_env("DAYPLAN_OPENAI_API_KEY"),
            openai_model: non_empty_env("DAYPLAN_OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            maps_api_key: non_empty_env("DAYPLAN_MAPS_API_KEY"),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn transport_error(error: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(error.to_string())
}

/// Maps non-success statuses, treating 401 and 403 as credential failures.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Unauthorized(
            format!("status {}: {}", status.as_u16(), truncate(&body, 300)),
        )),
        _ => Err(ProviderError::Status {
            status: status.as_u16(),
            body: truncate(&body, 300),
        }),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("£££££", 2), "££");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
