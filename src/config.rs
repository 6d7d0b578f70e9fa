//! Configuration types.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Upstream origin used when `MAYADESTEK_API_BASE` is not set.
pub const DEFAULT_API_BASE: &str = "https://mayadestek-api-355l5o2k7q7q-uc.a.run.app";

/// Build identifier reported when no commit sha is available.
pub const LOCAL_BUILD_ID: &str = "local";

/// Environment variables checked, in order, for the commit sha.
const BUILD_ID_VARS: [&str; 2] = ["VERCEL_GIT_COMMIT_SHA", "GIT_COMMIT_SHA"];

/// Proxy configuration, read once at startup and shared read-only.
#[derive(Clone)]
pub struct ProxyConfig {
    /// Upstream secret. `None` makes every onboarding request fail with 500.
    pub api_key: Option<SecretString>,
    /// Upstream origin as configured; echoed back in success responses.
    pub api_base: String,
    /// Short build identifier echoed in every response.
    pub build_id: String,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Linear backoff step between `schema_not_ready` retries.
    pub retry_step: Duration,
}

impl ProxyConfig {
    /// Build a configuration for a given secret and upstream base, with
    /// defaults for everything else.
    pub fn new(api_key: Option<SecretString>, api_base: impl Into<String>) -> Self {
        Self {
            api_key,
            api_base: api_base.into(),
            build_id: LOCAL_BUILD_ID.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            retry_step: Duration::from_millis(500),
        }
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = build_id.into();
        self
    }

    pub fn with_retry_step(mut self, step: Duration) -> Self {
        self.retry_step = step;
        self
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var("MAYADESTEK_API_KEY").map(SecretString::from);
        let api_base = var("MAYADESTEK_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let build_id = resolve_build_id(&var);

        let host = var("ONBOARDING_PROXY_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match var("ONBOARDING_PROXY_PORT").or_else(|| var("PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "ONBOARDING_PROXY_PORT".to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => 3000,
        };
        let bind_addr: SocketAddr = format!("{host}:{port}").parse().map_err(|e| {
            ConfigError::InvalidValue {
                key: "ONBOARDING_PROXY_HOST".to_string(),
                message: format!("{host:?}: {e}"),
            }
        })?;

        let retry_step_ms = match var("ONBOARDING_PROXY_RETRY_STEP_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "ONBOARDING_PROXY_RETRY_STEP_MS".to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => 500,
        };

        Ok(Self {
            api_key,
            api_base,
            build_id,
            bind_addr,
            retry_step: Duration::from_millis(retry_step_ms),
        })
    }

    /// Full upstream URL for starting an onboarding.
    pub fn onboarding_url(&self) -> String {
        format!(
            "{}/public/onboarding/start",
            self.api_base.trim().trim_end_matches('/')
        )
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("build_id", &self.build_id)
            .field("bind_addr", &self.bind_addr)
            .field("retry_step", &self.retry_step)
            .finish()
    }
}

/// First 7 characters of the first commit sha found, else `"local"`.
fn resolve_build_id<F>(var: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    BUILD_ID_VARS
        .iter()
        .find_map(|key| var(key))
        .map(|sha| sha.trim().chars().take(7).collect())
        .unwrap_or_else(|| LOCAL_BUILD_ID.to_string())
}
