//! Double-submit CSRF protection.
//!
//! The token is set as a readable cookie so the frontend can copy it into the
//! `X-CSRF-Token` header. Cross-site requests carry the cookie but cannot read it,
//! so they cannot produce a matching header.

use anyhow::{Context, Result};
use axum::http::{
    HeaderMap, HeaderValue, Method,
    header::{COOKIE, InvalidHeaderValue},
};
use subtle::ConstantTimeEq;

use crate::{error::AuthError, tokens::utils::generate_opaque_token};

pub const CSRF_HEADER_NAME: &str = "x-csrf-token";
pub const DEFAULT_CSRF_COOKIE_NAME: &str = "csrf_token";

/// Why a mutating request was refused. Logged, never returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsrfFailure {
    MissingCookie,
    MissingHeader,
    Mismatch,
}

impl CsrfFailure {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingCookie => "missing_cookie",
            Self::MissingHeader => "missing_header",
            Self::Mismatch => "mismatch",
        }
    }
}

impl From<CsrfFailure> for AuthError {
    fn from(_: CsrfFailure) -> Self {
        Self::CsrfMismatch
    }
}

#[derive(Clone, Debug)]
pub struct CsrfGuard {
    cookie_name: String,
    secure: bool,
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self::new(DEFAULT_CSRF_COOKIE_NAME.to_string(), true)
    }
}

impl CsrfGuard {
    #[must_use]
    pub fn new(cookie_name: String, secure: bool) -> Self {
        Self {
            cookie_name,
            secure,
        }
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// New token plus the `Set-Cookie` value carrying it.
    ///
    /// # Errors
    /// Returns an error if randomness fails or the cookie name is not a valid header value.
    pub fn issue(&self) -> Result<(String, HeaderValue)> {
        let token = generate_opaque_token()?;
        let cookie = self
            .cookie(&token)
            .context("failed to build csrf cookie")?;
        Ok((token, cookie))
    }

    fn cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        // Not HttpOnly: the frontend must read it back into the header.
        let mut cookie = format!("{}={token}; Path=/; SameSite=Strict", self.cookie_name);
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// Decide whether a request may proceed.
    ///
    /// Safe methods always pass, as do requests already authenticated by a bearer token.
    ///
    /// # Errors
    /// Returns the failure kind for a mutating request without a matching cookie/header pair.
    pub fn protect(
        &self,
        method: &Method,
        headers: &HeaderMap,
        bearer_authenticated: bool,
    ) -> Result<(), CsrfFailure> {
        if !requires_check(method) || bearer_authenticated {
            return Ok(());
        }
        let cookie = cookie_value(headers, &self.cookie_name).ok_or(CsrfFailure::MissingCookie)?;
        let header = headers
            .get(CSRF_HEADER_NAME)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(CsrfFailure::MissingHeader)?;

        if bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) {
            Ok(())
        } else {
            Err(CsrfFailure::Mismatch)
        }
    }
}

fn requires_check(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name)
                .then(|| val.trim().to_string())
                .filter(|val| !val.is_empty())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: Option<&str>, header: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&format!("theme=dark; csrf_token={cookie}"))
                    .unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }
        if let Some(header) = header {
            headers.insert(
                CSRF_HEADER_NAME,
                HeaderValue::from_str(header).unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }
        headers
    }

    #[test]
    fn safe_methods_always_pass() {
        let guard = CsrfGuard::default();
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert_eq!(guard.protect(&method, &HeaderMap::new(), false), Ok(()));
        }
    }

    #[test]
    fn cookie_without_header_is_rejected() {
        let guard = CsrfGuard::default();
        assert_eq!(
            guard.protect(&Method::POST, &headers(Some("abc"), None), false),
            Err(CsrfFailure::MissingHeader)
        );
        assert_eq!(
            guard.protect(&Method::DELETE, &headers(None, Some("abc")), false),
            Err(CsrfFailure::MissingCookie)
        );
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let guard = CsrfGuard::default();
        assert_eq!(
            guard.protect(&Method::PUT, &headers(Some("abc"), Some("abd")), false),
            Err(CsrfFailure::Mismatch)
        );
    }

    #[test]
    fn matching_pair_passes() {
        let guard = CsrfGuard::default();
        assert_eq!(
            guard.protect(&Method::PATCH, &headers(Some("abc"), Some("abc")), false),
            Ok(())
        );
    }

    #[test]
    fn bearer_requests_skip_the_check() {
        let guard = CsrfGuard::default();
        assert_eq!(guard.protect(&Method::POST, &HeaderMap::new(), true), Ok(()));
    }

    #[test]
    fn issued_cookie_is_readable_and_carries_token() -> Result<()> {
        let guard = CsrfGuard::new("csrf_token".to_string(), true);
        let (token, cookie) = guard.issue()?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with(&format!("csrf_token={token};")));
        assert!(cookie.contains("Secure"));
        assert!(!cookie.contains("HttpOnly"));

        let insecure = CsrfGuard::new("csrf_token".to_string(), false);
        let (_, cookie) = insecure.issue()?;
        assert!(!cookie.to_str()?.contains("Secure"));
        Ok(())
    }
}
