use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dayplan_core::{sanitize, PlanError, ProviderError, TextGenerator};
use dayplan_observability::AppMetrics;
use serde_json::Value;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Why a single generation attempt did not produce a usable structure.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    Provider(ProviderError),
    Malformed(PlanError),
    Parse(String),
    MissingEvents,
}

impl AttemptFailure {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Provider(error) if error.is_auth())
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(error) => write!(f, "provider failure: {error}"),
            Self::Malformed(error) => write!(f, "{error}"),
            Self::Parse(message) => write!(f, "sanitized response is not valid JSON: {message}"),
            Self::MissingEvents => write!(f, "response has no `events` array"),
        }
    }
}

/// Sanitizes, parses and structurally validates one raw model response.
pub fn parse_structured(text: &str) -> Result<Value, AttemptFailure> {
    let cleaned = sanitize(text).map_err(AttemptFailure::Malformed)?;
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|error| AttemptFailure::Parse(error.to_string()))?;

    match value.get("events") {
        Some(Value::Array(_)) => Ok(value),
        _ => Err(AttemptFailure::MissingEvents),
    }
}

pub struct GenerationRetrier<G> {
    generator: G,
    policy: RetryPolicy,
    metrics: Arc<AppMetrics>,
}

impl<G> GenerationRetrier<G>
where
    G: TextGenerator,
{
    pub fn new(generator: G, policy: RetryPolicy, metrics: Arc<AppMetrics>) -> Self {
        Self {
            generator,
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            metrics,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the parsed draft unmodified; field-level validation belongs to
    /// the consumer.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn generate(&self, prompt: &str) -> Result<Value, PlanError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 1..=max_attempts {
            self.metrics.inc_generation_attempt();

            let failure = match self.attempt(prompt).await {
                Ok(value) => {
                    info!(attempt, "generation succeeded");
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            self.metrics.inc_generation_failure();
            if !failure.is_retryable() {
                warn!(attempt, reason = %failure, "generation rejected credentials");
                return Err(match failure {
                    AttemptFailure::Provider(error) => error.into(),
                    other => PlanError::AuthenticationFailure(other.to_string()),
                });
            }

            warn!(attempt, max_attempts, reason = %failure, "generation attempt failed");
            last_failure = Some(failure);
            if attempt < max_attempts {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        Err(PlanError::GenerationExhausted {
            attempts: max_attempts,
            reason: last_failure
                .map(|failure| failure.to_string())
                .unwrap_or_else(|| "no attempts were made".to_string()),
        })
    }

    async fn attempt(&self, prompt: &str) -> Result<Value, AttemptFailure> {
        let text = self
            .generator
            .generate_text(prompt)
            .await
            .map_err(AttemptFailure::Provider)?;
        parse_structured(&text)
    }
}
