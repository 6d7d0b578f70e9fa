//! HTTP endpoints for the onboarding proxy.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::auth::AuthHeader;
use super::model::{is_truthy, normalize};
use super::upstream::UpstreamClient;
use crate::config::ProxyConfig;
use crate::error::{ConfigError, ErrorResponse, ProxyError, Result, ValidationError};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub config: Arc<ProxyConfig>,
    pub upstream: UpstreamClient,
}

impl OnboardingRouteState {
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        let upstream = UpstreamClient::new(&config);
        Self { config, upstream }
    }

    /// Validate, normalize and forward one submission.
    async fn forward(&self, raw: &[u8]) -> Result<Value> {
        let secret = self
            .config
            .api_key
            .as_ref()
            .ok_or(ConfigError::MissingApiKey)?;

        let body = parse_body(raw)?;
        let payload = normalize(&body)?;
        let auth = AuthHeader::from_secret(secret);

        let success = self.upstream.start_onboarding(&auth, &payload).await?;
        info!(
            attempts = success.attempts,
            status = success.status.as_u16(),
            "Onboarding forwarded"
        );

        Ok(success_body(
            &self.config.build_id,
            success.body,
            &self.config.api_base,
            self.upstream.url(),
        ))
    }
}

/// Parse the inbound body. Unparseable input and falsy JSON (`null`,
/// `false`, `0`, `""`) are rejected alike.
fn parse_body(raw: &[u8]) -> std::result::Result<Value, ValidationError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(value) if !is_truthy(&value) => Err(ValidationError::InvalidJson {
            reason: format!("body is {value}"),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ValidationError::InvalidJson {
            reason: e.to_string(),
        }),
    }
}

/// Merge the upstream body with diagnostics. Upstream keys may replace
/// `build`, but never `base_url` or `backend_url`.
fn success_body(
    build: &str,
    upstream: Map<String, Value>,
    base_url: &str,
    backend_url: &str,
) -> Value {
    let mut merged = Map::new();
    merged.insert("build".to_string(), Value::from(build));
    merged.extend(upstream);
    merged.insert("base_url".to_string(), Value::from(base_url));
    merged.insert("backend_url".to_string(), Value::from(backend_url));
    Value::Object(merged)
}

/// POST /api/onboarding/start
///
/// Forwards the landing page form to the backend. Every outcome, including
/// failures, is answered with a JSON body carrying the build identifier.
async fn start_onboarding(State(state): State<OnboardingRouteState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("onboarding_start", %request_id);

    async move {
        match state.forward(&body).await {
            Ok(merged) => Json(merged).into_response(),
            Err(e) => {
                match &e {
                    ProxyError::Validation(v) => info!(
                        error = %e,
                        reason = v.reason().unwrap_or_default(),
                        "Rejected onboarding submission"
                    ),
                    _ => warn!(error = %e, "Onboarding request failed"),
                }
                ErrorResponse::new(state.config.build_id.clone(), e).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

/// GET /health
async fn health(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "onboarding-proxy",
        "build": state.config.build_id,
    }))
}

/// Build the onboarding routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/start", post(start_onboarding))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
