//! Onboarding Proxy — server-side forwarder for the landing page sign-up form.

pub mod config;
pub mod error;
pub mod onboarding;
