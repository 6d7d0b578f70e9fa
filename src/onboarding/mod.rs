//! Onboarding proxy — forwards landing page sign-ups to the backend.
//!
//! A submission is normalized into the backend's field names, the configured
//! secret is turned into the right auth header, and the payload is forwarded
//! to `{base}/public/onboarding/start`, retrying while the backend reports
//! `schema_not_ready`.

pub mod auth;
pub mod model;
pub mod routes;
pub mod upstream;

pub use auth::AuthHeader;
pub use model::{DraftPayload, NormalizedPayload, normalize};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use upstream::{ParsedBody, RetryPolicy, UpstreamClient, UpstreamSuccess};
