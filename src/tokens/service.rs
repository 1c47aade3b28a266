//! Token issuance, rotation and revocation.
//!
//! Flow Overview:
//! 1) Login issues an access token plus a refresh token that starts a new family.
//! 2) Refresh rotates: the presented record is revoked and linked to its successor in
//!    one conditional store write.
//! 3) A rotated-out token presented again is treated as theft and the whole family is
//!    revoked.
//!
//! Store writes run in spawned tasks whose handles are awaited, so a dropped request
//! future cannot abandon a rotation halfway.

use anyhow::{Context, Result};
use std::{future::Future, sync::Arc};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    ClientContext,
    access::{AccessTokenCodec, AccessTokenError, Principal},
    utils::{generate_opaque_token, hash_refresh_token},
};
use crate::{
    clock::Clock,
    error::AuthError,
    store::{RefreshTokenRecord, RefreshTokenStore, User, UserStore},
};

/// Access + refresh pair returned to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Why a refresh token was refused. Kept distinct for audit logs only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenRejection {
    Invalid,
    Expired,
    ReuseDetected,
}

impl From<TokenRejection> for AuthError {
    fn from(rejection: TokenRejection) -> Self {
        match rejection {
            TokenRejection::Invalid => Self::InvalidToken,
            TokenRejection::Expired => Self::ExpiredToken,
            TokenRejection::ReuseDetected => Self::ReuseDetected,
        }
    }
}

impl From<AccessTokenError> for AuthError {
    fn from(err: AccessTokenError) -> Self {
        match err {
            AccessTokenError::Invalid => Self::InvalidToken,
            AccessTokenError::Expired => Self::ExpiredToken,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RotationOutcome {
    Rotated(TokenPair),
    Rejected(TokenRejection),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevocationReason {
    Logout,
    LogoutEverywhere,
    PasswordChange,
}

impl RevocationReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::LogoutEverywhere => "logout_everywhere",
            Self::PasswordChange => "password_change",
        }
    }
}

pub struct TokenService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    access: AccessTokenCodec,
    clock: Arc<dyn Clock>,
    refresh_ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        access: AccessTokenCodec,
        clock: Arc<dyn Clock>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            access,
            clock,
            refresh_ttl,
        }
    }

    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access.ttl().whole_seconds()
    }

    /// Issue a pair for a fresh login; the refresh token starts a new family.
    ///
    /// # Errors
    /// Returns an error if token generation, signing or the store insert fails.
    pub async fn issue_token_pair(&self, user: &User, client: &ClientContext) -> Result<TokenPair> {
        let now = self.clock.now();
        let family_id = Uuid::new_v4();
        let (refresh_token, record) = self.new_refresh_record(user.id, family_id, now)?;
        let access_token = self.access.issue(user, client, now)?;

        let store = Arc::clone(&self.refresh_tokens);
        detached(async move { store.insert_refresh_token(&record).await }).await?;

        info!(user_id = %user.id, family_id = %family_id, "Issued token pair");
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_seconds(),
        })
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// # Errors
    /// Only store or signing failures are errors; a refused token is
    /// `RotationOutcome::Rejected`.
    pub async fn rotate_refresh_token(
        &self,
        raw_token: &str,
        client: &ClientContext,
    ) -> Result<RotationOutcome> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Ok(RotationOutcome::Rejected(TokenRejection::Invalid));
        }
        let token_hash = hash_refresh_token(raw_token);
        let now = self.clock.now();

        let Some(record) = self.refresh_tokens.find_refresh_token(&token_hash).await? else {
            debug!("Refresh token not found");
            return Ok(RotationOutcome::Rejected(TokenRejection::Invalid));
        };

        if let Some(rejection) = classify(&record, now) {
            self.compensate(&record, rejection, now).await?;
            return Ok(RotationOutcome::Rejected(rejection));
        }

        let user = match self.users.find_user(record.user_id).await? {
            Some(user) if user.active => user,
            _ => {
                warn!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    "Refresh token owner missing or disabled; revoking family"
                );
                self.revoke_family(record.family_id, now).await?;
                return Ok(RotationOutcome::Rejected(TokenRejection::Invalid));
            }
        };

        let (refresh_token, successor) =
            self.new_refresh_record(user.id, record.family_id, now)?;
        let access_token = self.access.issue(&user, client, now)?;

        let store = Arc::clone(&self.refresh_tokens);
        let current_hash = token_hash.clone();
        let won = detached(async move {
            store
                .rotate_refresh_token(&current_hash, &successor, now)
                .await
        })
        .await?;

        if !won {
            // Lost the compare-and-swap: someone else rotated or revoked this record
            // between our read and our write. Re-read and judge it again.
            let current = self
                .refresh_tokens
                .find_refresh_token(&token_hash)
                .await?
                .unwrap_or(record);
            let rejection = classify(&current, now).unwrap_or(TokenRejection::Invalid);
            self.compensate(&current, rejection, now).await?;
            return Ok(RotationOutcome::Rejected(rejection));
        }

        debug!(user_id = %user.id, family_id = %record.family_id, "Rotated refresh token");
        Ok(RotationOutcome::Rotated(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_seconds(),
        }))
    }

    /// Revoke one refresh token (single-device logout). Unknown or already revoked
    /// tokens are a no-op.
    ///
    /// # Errors
    /// Returns an error if the store update fails.
    pub async fn revoke_single_token(&self, raw_token: &str) -> Result<bool> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Ok(false);
        }
        let token_hash = hash_refresh_token(raw_token);
        let now = self.clock.now();
        let store = Arc::clone(&self.refresh_tokens);
        let revoked =
            detached(async move { store.revoke_refresh_token(&token_hash, now).await }).await?;
        debug!(revoked, "Single refresh token revocation");
        Ok(revoked)
    }

    /// Revoke every active refresh token of a user.
    ///
    /// # Errors
    /// Returns an error if the store update fails.
    pub async fn revoke_all_user_tokens(
        &self,
        user_id: Uuid,
        reason: RevocationReason,
    ) -> Result<u64> {
        let now = self.clock.now();
        let store = Arc::clone(&self.refresh_tokens);
        let revoked =
            detached(async move { store.revoke_user_tokens(user_id, now).await }).await?;
        info!(
            user_id = %user_id,
            reason = reason.as_str(),
            revoked,
            "Revoked all refresh tokens for user"
        );
        Ok(revoked)
    }

    /// Validate a bearer access token.
    ///
    /// # Errors
    /// Returns the access token failure kind.
    pub fn verify_access_token(&self, token: &str) -> Result<Principal, AccessTokenError> {
        self.access.verify(token, self.clock.now())
    }

    fn new_refresh_record(
        &self,
        user_id: Uuid,
        family_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(String, RefreshTokenRecord)> {
        let raw = generate_opaque_token().context("failed to generate refresh token")?;
        let record = RefreshTokenRecord {
            token_hash: hash_refresh_token(&raw),
            user_id,
            family_id,
            issued_at: now,
            expires_at: now + self.refresh_ttl,
            revoked_at: None,
            replaced_by_hash: None,
        };
        Ok((raw, record))
    }

    async fn compensate(
        &self,
        record: &RefreshTokenRecord,
        rejection: TokenRejection,
        now: OffsetDateTime,
    ) -> Result<()> {
        match rejection {
            TokenRejection::ReuseDetected => {
                error!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    "Refresh token reuse detected; revoking family"
                );
                self.revoke_family(record.family_id, now).await?;
            }
            TokenRejection::Expired => {
                let store = Arc::clone(&self.refresh_tokens);
                let token_hash = record.token_hash.clone();
                detached(async move { store.revoke_refresh_token(&token_hash, now).await })
                    .await?;
                debug!(family_id = %record.family_id, "Expired refresh token revoked");
            }
            TokenRejection::Invalid => {
                debug!(family_id = %record.family_id, "Revoked refresh token presented");
            }
        }
        Ok(())
    }

    async fn revoke_family(&self, family_id: Uuid, now: OffsetDateTime) -> Result<u64> {
        let store = Arc::clone(&self.refresh_tokens);
        let revoked = detached(async move { store.revoke_family(family_id, now).await }).await?;
        warn!(family_id = %family_id, revoked, "Refresh token family revoked");
        Ok(revoked)
    }
}

/// Decide whether a stored record may be rotated at `now`.
fn classify(record: &RefreshTokenRecord, now: OffsetDateTime) -> Option<TokenRejection> {
    if record.was_rotated() {
        Some(TokenRejection::ReuseDetected)
    } else if record.is_revoked() {
        Some(TokenRejection::Invalid)
    } else if record.is_expired(now) {
        Some(TokenRejection::Expired)
    } else {
        None
    }
}

/// Run a store write to completion even if the caller's future is dropped.
async fn detached<T, F>(write: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(write).await.context("store write task failed")?
}
