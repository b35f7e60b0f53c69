use dayplan_core::{ProviderError, TextGenerator};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::{ensure_success, transport_error};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";
const SYSTEM_PROMPT: &str =
    "You are a local travel planner. Reply with a single JSON object and nothing else.";

#[derive(Clone)]
pub struct OpenAiTextGenerator {
    http: Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiTextGenerator {
    pub fn new(http: Client, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            model: model.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn payload(&self, prompt: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "input": [
                {
                    "role": "system",
                    "content": [
                        { "type": "input_text", "text": SYSTEM_PROMPT }
                    ]
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "input_text", "text": prompt }
                    ]
                }
            ]
        })
    }
}

impl TextGenerator for OpenAiTextGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Unauthorized("DAYPLAN_OPENAI_API_KEY is not set".to_string())
        })?;

        let response = self
            .http
            .post(RESPONSES_URL)
            .bearer_auth(api_key)
            .json(&self.payload(prompt))
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidPayload(error.to_string()))?;
        let text = extract_output_text(&body)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidPayload("response has no output text".to_string())
            })?;

        debug!(model = %self.model, chars = text.len(), "generation received");
        Ok(text)
    }
}

/// Collects the `output_text` parts of a Responses API payload.
pub fn extract_output_text(payload: &Value) -> Option<String> {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    let chunks = payload
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>();

    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_top_level_output_text() {
        let payload = serde_json::json!({ "output_text": "{\"events\": []}" });
        assert_eq!(
            extract_output_text(&payload).as_deref(),
            Some("{\"events\": []}")
        );
    }

    #[test]
    fn joins_message_parts_and_skips_reasoning() {
        let payload = serde_json::json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                {
                    "type": "message",
                    "content": [
                        { "type": "output_text", "text": "{\"events\":" },
                        { "type": "refusal", "refusal": "no" },
                        { "type": "output_text", "text": "[]}" }
                    ]
                }
            ]
        });
        assert_eq!(
            extract_output_text(&payload).as_deref(),
            Some("{\"events\":\n\n[]}")
        );
        assert!(extract_output_text(&serde_json::json!({ "output": [] })).is_none());
    }

    #[tokio::test]
    async fn missing_key_is_an_auth_failure() {
        let generator = OpenAiTextGenerator::new(Client::new(), None, DEFAULT_OPENAI_MODEL);
        let error = generator.generate_text("plan").await.unwrap_err();
        assert!(error.is_auth());
    }
}
