use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use decern_gate_api::{JudgeDiffResult, Reference};

/// Where and how to reach the decision service for one kind of call.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    /// Service base URL without a trailing path.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: SecretString,
    /// Per-call timeout; the request is abandoned once it elapses.
    pub timeout: Duration,
}

impl ServiceEndpoint {
    /// Construct an endpoint description.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<SecretString>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout,
        }
    }

    /// Join an API path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// A single reference validation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    /// Reference to look up.
    pub reference: Reference,
    /// Whether the change being gated is high-impact.
    pub high_impact: bool,
    /// Ask the service to also require a PR linked to the decision.
    pub require_linked_pr: bool,
}

/// What the service said about a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationOutcome {
    /// HTTP status of the response.
    #[serde(skip)]
    pub http_status: u16,
    /// Service verdict.
    #[serde(default)]
    pub valid: bool,
    /// Decision status such as `approved` or `proposed`.
    #[serde(default)]
    pub status: Option<String>,
    /// Explanation for a rejection.
    #[serde(default)]
    pub reason: Option<String>,
    /// Non-blocking note attached by the service.
    #[serde(default)]
    pub observation: Option<String>,
}

impl ValidationOutcome {
    /// Only `200` together with `valid: true` counts as success.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.http_status == 200 && self.valid
    }
}

/// Model credentials the judge runs with. Never logged.
#[derive(Debug, Clone)]
pub struct JudgeCredentials {
    /// Model provider base URL.
    pub base_url: String,
    /// Model provider API key.
    pub api_key: SecretString,
    /// Model name.
    pub model: String,
}

/// Payload for a judge call.
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    /// Bounded diff and the revisions it covers.
    pub diff: JudgeDiffResult,
    /// The reference that passed validation.
    pub reference: Reference,
    /// Caller-supplied model credentials.
    pub credentials: JudgeCredentials,
}

/// Judge response with confidence already normalized to `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JudgeVerdict {
    /// Whether the diff matches the decision.
    pub allowed: bool,
    /// Explanation from the judge.
    pub reason: Option<String>,
    /// A rejection that should only warn.
    pub advisory: bool,
    /// Judge confidence, when reported.
    pub confidence: Option<f64>,
    /// Extra text for advisory outcomes.
    pub advisory_message: Option<String>,
}

/// Accept a fraction or a percentage and map it onto `0.0..=1.0`.
///
/// Values above `1.0` are read as percentages. Non-finite or negative input
/// yields `None`.
#[must_use]
pub fn normalize_confidence(value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let fraction = if value > 1.0 { value / 100.0 } else { value };
    Some(fraction.min(1.0))
}

/// Errors surfaced by client implementations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The call did not finish before the endpoint timeout.
    #[error("{operation} request timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Which call timed out.
        operation: &'static str,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// Connection or protocol failure before a response arrived.
    #[error("{operation} request failed: {message}")]
    Transport {
        /// Which call failed.
        operation: &'static str,
        /// Underlying error text.
        message: String,
    },
    /// The service answered with an unexpected status.
    #[error("{operation} request returned HTTP {status}: {message}")]
    Status {
        /// Which call failed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Body excerpt or service reason.
        message: String,
    },
    /// The response body could not be decoded.
    #[error("{operation} response could not be decoded: {message}")]
    Decode {
        /// Which call failed.
        operation: &'static str,
        /// Decoder error text.
        message: String,
    },
    /// The judge is not available on the caller's plan.
    #[error("judge unavailable: {message}")]
    FeatureUnavailable {
        /// Service-provided explanation.
        message: String,
    },
}

/// Convenience result alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
