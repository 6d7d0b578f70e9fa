//! Forwarding to the upstream onboarding backend.
//!
//! The backend answers `503 {"error": "schema_not_ready"}` while it is still
//! migrating. That response, and only that one, is retried with a linear
//! backoff. Every other non-2xx answer is returned to the caller as-is.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::auth::AuthHeader;
use super::model::NormalizedPayload;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, UpstreamError};

/// Error code the backend reports while its schema is being migrated.
pub const SCHEMA_NOT_READY: &str = "schema_not_ready";

/// Bounded linear backoff for `schema_not_ready` responses.
///
/// The delay after attempt `n` is `n * step`, for attempts 1 to 5. Once the
/// sixth request is still not ready the proxy gives up at once instead of
/// sleeping another 3s with nothing left to send. The worst-case wait is
/// therefore 7.5s rather than 10.5s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of requests sent, including the first one.
    pub max_attempts: u32,
    /// Delay after attempt `n` is `n * step`.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            step: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_step(step: Duration) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (1-based) attempt failed transiently.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step * attempt
    }

    /// Sum of all delays a request can spend waiting before giving up.
    #[cfg(test)]
    fn total_wait(&self) -> Duration {
        (1..self.max_attempts).map(|n| self.delay_for(n)).sum()
    }
}

/// An upstream body, parsed as JSON where possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    Text(String),
}

impl ParsedBody {
    /// Interpret a body as JSON when the content type says so and it parses;
    /// otherwise keep the raw text.
    pub fn parse(content_type: &str, bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        if content_type.contains("application/json") {
            if let Ok(value) = serde_json::from_str(&text) {
                return Self::Json(value);
            }
        }
        Self::Text(text.into_owned())
    }

    /// Top-level `error` string of the body, if any.
    ///
    /// Text bodies are still checked in case the backend sent JSON with the
    /// wrong content type.
    pub fn error_code(&self) -> Option<String> {
        match self {
            Self::Json(value) => value.get("error")?.as_str().map(str::to_string),
            Self::Text(text) => serde_json::from_str::<Value>(text)
                .ok()?
                .get("error")?
                .as_str()
                .map(str::to_string),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }
}

/// Parse a success body as a JSON object, or fall back to an empty one.
pub fn object_or_empty(bytes: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// A 2xx answer from the backend.
#[derive(Debug, Clone)]
pub struct UpstreamSuccess {
    pub status: StatusCode,
    pub body: Map<String, Value>,
    /// Number of requests it took, including the successful one.
    pub attempts: u32,
}

/// A non-2xx answer from the backend.
#[derive(Debug, Clone)]
struct UpstreamFailure {
    status: StatusCode,
    body: ParsedBody,
}

impl UpstreamFailure {
    async fn read(response: Response) -> Result<Self, ProxyError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.bytes().await?;
        Ok(Self {
            status,
            body: ParsedBody::parse(&content_type, &bytes),
        })
    }

    fn is_schema_not_ready(&self) -> bool {
        self.status == StatusCode::SERVICE_UNAVAILABLE
            && self.body.error_code().as_deref() == Some(SCHEMA_NOT_READY)
    }
}

/// Client for the backend's public onboarding endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_client(
            reqwest::Client::new(),
            config.onboarding_url(),
            RetryPolicy::with_step(config.retry_step),
        )
    }

    pub fn with_client(http: reqwest::Client, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            url: url.into(),
            retry,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward a normalized payload, retrying while the backend reports
    /// `schema_not_ready`.
    ///
    /// Transport failures are not retried and come back as
    /// [`ProxyError::Internal`].
    pub async fn start_onboarding(
        &self,
        auth: &AuthHeader,
        payload: &NormalizedPayload,
    ) -> Result<UpstreamSuccess, ProxyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        auth.apply(&mut headers)?;

        let mut attempt = 1;
        loop {
            debug!(attempt, url = %self.url, "Forwarding onboarding request");

            let response = self
                .http
                .post(&self.url)
                .headers(headers.clone())
                .json(payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let bytes = response.bytes().await?;
                debug!(attempt, status = status.as_u16(), "Upstream accepted onboarding");
                return Ok(UpstreamSuccess {
                    status,
                    body: object_or_empty(&bytes),
                    attempts: attempt,
                });
            }

            let failure = UpstreamFailure::read(response).await?;
            if failure.is_schema_not_ready() && attempt < self.retry.max_attempts {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Upstream schema not ready, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            warn!(
                attempt,
                status = failure.status.as_u16(),
                "Upstream rejected onboarding request"
            );
            return Err(UpstreamError::Rejected {
                url: self.url.clone(),
                status: failure.status.as_u16(),
                body: failure.body.into_value(),
            }
            .into());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_policy_is_six_attempts_at_half_second_steps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(6), Duration::from_millis(3000));
    }

    #[test]
    fn no_wait_follows_the_final_attempt() {
        let policy = RetryPolicy::default();
        // 500 + 1000 + 1500 + 2000 + 2500; attempt 6 is never followed by a sleep.
        assert_eq!(policy.total_wait(), Duration::from_millis(7500));
        assert!(policy.total_wait() <= Duration::from_millis(10_500));
    }

    #[test]
    fn json_body_parsed_only_for_json_content_type() {
        let raw = br#"{"error":"bad_phone"}"#;
        assert_eq!(
            ParsedBody::parse("application/json; charset=utf-8", raw),
            ParsedBody::Json(json!({"error": "bad_phone"}))
        );
        assert_eq!(
            ParsedBody::parse("text/plain", raw),
            ParsedBody::Text(r#"{"error":"bad_phone"}"#.into())
        );
    }

    #[test]
    fn malformed_json_keeps_raw_text() {
        assert_eq!(
            ParsedBody::parse("application/json", b"<html>oops</html>"),
            ParsedBody::Text("<html>oops</html>".into())
        );
    }

    #[test]
    fn error_code_reads_json_and_json_looking_text() {
        let json_body = ParsedBody::Json(json!({"error": "schema_not_ready"}));
        assert_eq!(json_body.error_code().as_deref(), Some(SCHEMA_NOT_READY));

        let text_body = ParsedBody::Text(r#"{"error":"schema_not_ready"}"#.into());
        assert_eq!(text_body.error_code().as_deref(), Some(SCHEMA_NOT_READY));

        assert_eq!(ParsedBody::Text("Service Unavailable".into()).error_code(), None);
        assert_eq!(ParsedBody::Json(json!({"error": 7})).error_code(), None);
    }

    #[test]
    fn schema_not_ready_requires_503() {
        let body = ParsedBody::Json(json!({"error": "schema_not_ready"}));
        let transient = UpstreamFailure {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: body.clone(),
        };
        assert!(transient.is_schema_not_ready());

        let wrong_status = UpstreamFailure {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body,
        };
        assert!(!wrong_status.is_schema_not_ready());

        let wrong_code = UpstreamFailure {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ParsedBody::Json(json!({"error": "maintenance"})),
        };
        assert!(!wrong_code.is_schema_not_ready());
    }

    #[test]
    fn success_body_falls_back_to_empty_object() {
        assert!(object_or_empty(b"not json").is_empty());
        assert!(object_or_empty(b"[1,2,3]").is_empty());
        assert!(object_or_empty(b"").is_empty());
        assert_eq!(object_or_empty(br#"{"id":"s1"}"#)["id"], "s1");
    }

    #[test]
    fn client_uses_configured_url_and_step() {
        let config = ProxyConfig::new(None, "http://127.0.0.1:9/")
            .with_retry_step(Duration::from_millis(10));
        let client = UpstreamClient::new(&config);
        assert_eq!(client.url(), "http://127.0.0.1:9/public/onboarding/start");
        assert_eq!(client.retry.step, Duration::from_millis(10));
        assert_eq!(client.retry.max_attempts, 6);
    }
}
