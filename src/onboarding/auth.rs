//! Upstream credential presentation.
//!
//! The configured secret is either a plain API key or a bearer token. Which
//! one is decided from its shape so deployments never have to pre-format it.

use std::fmt;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::ProxyError;

const API_KEY_HEADER: &str = "x-api-key";

/// How the secret is presented to the upstream backend.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader {
    /// `Authorization: Bearer <token>`; holds the full header value.
    Bearer(String),
    /// `x-api-key: <key>`.
    ApiKey(String),
}

impl AuthHeader {
    /// Pick a header strategy for a secret.
    ///
    /// JWT-shaped secrets (three `.`-separated segments) and secrets already
    /// starting with `bearer ` go out as `Authorization`; anything else is an
    /// API key.
    pub fn select(secret: &str) -> Self {
        let trimmed = secret.trim();
        let looks_like_jwt = trimmed.split('.').count() == 3;
        let looks_like_bearer = trimmed
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "));

        if looks_like_bearer {
            Self::Bearer(trimmed.to_string())
        } else if looks_like_jwt {
            Self::Bearer(format!("Bearer {trimmed}"))
        } else {
            Self::ApiKey(trimmed.to_string())
        }
    }

    pub fn from_secret(secret: &SecretString) -> Self {
        Self::select(secret.expose_secret())
    }

    pub fn name(&self) -> HeaderName {
        match self {
            Self::Bearer(_) => AUTHORIZATION,
            Self::ApiKey(_) => HeaderName::from_static(API_KEY_HEADER),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Bearer(v) | Self::ApiKey(v) => v,
        }
    }

    /// Insert this header into an outbound header map.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), ProxyError> {
        let mut value = HeaderValue::from_str(self.value()).map_err(|_| {
            ProxyError::Internal(format!(
                "configured secret is not a valid {} header value",
                self.name()
            ))
        })?;
        value.set_sensitive(true);
        headers.insert(self.name(), value);
        Ok(())
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("AuthHeader::Bearer([REDACTED])"),
            Self::ApiKey(_) => f.write_str("AuthHeader::ApiKey([REDACTED])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_for(secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        AuthHeader::select(secret).apply(&mut headers).unwrap();
        headers
    }

    #[test]
    fn jwt_shaped_secret_becomes_bearer() {
        let headers = headers_for("abc.def.ghi");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc.def.ghi");
        assert!(headers.get(API_KEY_HEADER).is_none());
    }

    #[test]
    fn plain_key_becomes_api_key_header() {
        let headers = headers_for("sk_live_1234567890abcdef");
        assert_eq!(
            headers.get(API_KEY_HEADER).unwrap(),
            "sk_live_1234567890abcdef"
        );
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn existing_bearer_prefix_is_not_doubled() {
        assert_eq!(
            AuthHeader::select("Bearer opaque-token"),
            AuthHeader::Bearer("Bearer opaque-token".into())
        );
        assert_eq!(
            AuthHeader::select("bEaReR a.b.c"),
            AuthHeader::Bearer("bEaReR a.b.c".into())
        );
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            AuthHeader::select("  a.b.c\n"),
            AuthHeader::Bearer("Bearer a.b.c".into())
        );
        assert_eq!(
            AuthHeader::select(" key123 "),
            AuthHeader::ApiKey("key123".into())
        );
    }

    #[test]
    fn two_or_four_segments_are_not_jwt() {
        assert!(matches!(AuthHeader::select("a.b"), AuthHeader::ApiKey(_)));
        assert!(matches!(AuthHeader::select("a.b.c.d"), AuthHeader::ApiKey(_)));
    }

    #[test]
    fn non_ascii_prefix_does_not_panic() {
        assert!(matches!(AuthHeader::select("çççççççç"), AuthHeader::ApiKey(_)));
    }

    #[test]
    fn invalid_header_value_is_an_internal_error() {
        let mut headers = HeaderMap::new();
        let err = AuthHeader::select("bad\u{0}key")
            .apply(&mut headers)
            .unwrap_err();
        assert!(matches!(err, ProxyError::Internal(_)));
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let rendered = format!("{:?}", AuthHeader::select("sk_live_abc"));
        assert!(!rendered.contains("sk_live_abc"));
    }
}
