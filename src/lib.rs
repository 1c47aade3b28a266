//! # Trustgate (Session & Request-Trust Security Layer)
//!
//! `trustgate` is the security core in front of the compliance platform. It owns
//! token issuance and rotation, CSRF protection, per-request trust scoring and
//! certificate-based (PIV/CAC) strong authentication. Business routes sit behind it
//! and only ever see requests that passed the pipeline.
//!
//! ## Request Pipeline
//!
//! Every routed request passes, in order:
//!
//! 1. **Certificate adapter**: proxy-forwarded client certificate headers are checked
//!    against the issuer allow-list and the registration table.
//! 2. **Bearer check**: a valid `Authorization: Bearer` access token becomes a
//!    [`tokens::Principal`] in the request extensions.
//! 3. **Trust scoring**: a 0-100 score is computed and compared against the route's
//!    [`trust::PolicyLevel`] threshold.
//! 4. **CSRF guard**: mutating requests without a bearer token must echo the CSRF cookie
//!    in the `X-CSRF-Token` header.
//!
//! ## Refresh Token Families
//!
//! Refresh tokens are opaque; only their SHA-256 hash is persisted. Every login starts a
//! family, every rotation advances it by one record. Presenting a token that was already
//! rotated out revokes the whole family.
//!
//! ## Proxy Trust Boundary
//!
//! Certificate headers (`X-Client-Cert-*`) are trusted as-is. The reverse proxy must strip
//! them from client traffic and must be the only network path reaching this service.

pub mod api;
pub mod certs;
pub mod cli;
pub mod clock;
pub mod csrf;
pub mod error;
pub mod password;
pub mod store;
pub mod tokens;
pub mod trust;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
