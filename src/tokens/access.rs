//! Stateless HS256 access tokens.
//!
//! Flow Overview:
//! 1) Claims embed the principal (`sub`, `username`, `role`) and the issuing client
//!    context (`ip`, `dfp`) used later for continuity scoring.
//! 2) Expiry is checked against the injected clock, not the system time, so tests can
//!    move time deterministically.

use anyhow::{Result, anyhow};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{ClientContext, utils::fingerprint_user_agent};
use crate::store::{Role, User};

const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dfp: Option<String>,
}

/// Authenticated caller decoded from a valid access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub issued_ip: Option<String>,
    pub device_fingerprint: Option<String>,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenError {
    Invalid,
    Expired,
}

pub struct AccessTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCodec")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl AccessTokenCodec {
    /// # Errors
    /// Returns an error if the secret is shorter than 32 bytes or the TTL is not positive.
    pub fn new(secret: &SecretString, issuer: String, ttl: Duration) -> Result<Self> {
        let secret = secret.expose_secret().as_bytes();
        if secret.len() < MIN_SECRET_BYTES {
            return Err(anyhow!(
                "access token secret must be at least {MIN_SECRET_BYTES} bytes"
            ));
        }
        if ttl <= Duration::ZERO {
            return Err(anyhow!("access token ttl must be positive"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer,
            ttl,
        })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// # Errors
    /// Returns an error if the claims cannot be signed.
    pub fn issue(&self, user: &User, client: &ClientContext, now: OffsetDateTime) -> Result<String> {
        let claims = AccessClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iss: self.issuer.clone(),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            ip: client.ip.clone(),
            dfp: client.user_agent.as_deref().map(fingerprint_user_agent),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| anyhow!("failed to sign access token: {err}"))
    }

    /// Decode and validate a bearer token.
    ///
    /// # Errors
    /// Returns `Invalid` for bad signatures, issuers or claims, `Expired` once `exp` passed.
    pub fn verify(&self, token: &str, now: OffsetDateTime) -> Result<Principal, AccessTokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[self.issuer.as_str()]);

        let claims = decode::<AccessClaims>(token, &self.decoding, &validation)
            .map_err(|_| AccessTokenError::Invalid)?
            .claims;

        if now.unix_timestamp() >= claims.exp {
            return Err(AccessTokenError::Expired);
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AccessTokenError::Invalid)?;
        Ok(Principal {
            user_id,
            username: claims.username,
            role: claims.role,
            issued_ip: claims.ip,
            device_fingerprint: claims.dfp,
            expires_at: claims.exp,
        })
    }
}
