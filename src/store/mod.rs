//! Credential store adapters.
//!
//! The security layer only needs point lookups, inserts and conditional updates.
//! Every mutation of a refresh token record is a compare-and-swap on
//! `revoked_at IS NULL`, so two concurrent writers can never both win.
//!
//! Two adapters exist: [`PgStore`] for production and [`MemoryStore`] for tests and
//! embedders that do not want a database.

mod memory;
mod models;
mod postgres;

pub use memory::MemoryStore;
pub use models::{
    CertificateStatus, ClientCertificateRecord, RefreshTokenRecord, Role, User,
};
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Outcome when registering a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateInsertOutcome {
    Created,
    Conflict,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Returns `false` when the user does not exist.
    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<bool>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()>;

    async fn find_refresh_token(&self, token_hash: &[u8]) -> Result<Option<RefreshTokenRecord>>;

    /// Atomically revoke `current_hash`, link it to `successor` and insert `successor`.
    ///
    /// Returns `false` (and writes nothing) when `current_hash` was already revoked.
    async fn rotate_refresh_token(
        &self,
        current_hash: &[u8],
        successor: &RefreshTokenRecord,
        at: OffsetDateTime,
    ) -> Result<bool>;

    /// Revoke one record if still active. Returns whether this call revoked it.
    async fn revoke_refresh_token(&self, token_hash: &[u8], at: OffsetDateTime) -> Result<bool>;

    /// Revoke every active record of a family. Returns the number of records revoked.
    async fn revoke_family(&self, family_id: Uuid, at: OffsetDateTime) -> Result<u64>;

    /// Revoke every active record of a user. Returns the number of records revoked.
    async fn revoke_user_tokens(&self, user_id: Uuid, at: OffsetDateTime) -> Result<u64>;
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_certificate(
        &self,
        serial: &str,
        subject_dn: &str,
    ) -> Result<Option<ClientCertificateRecord>>;

    async fn insert_certificate(
        &self,
        record: &ClientCertificateRecord,
    ) -> Result<CertificateInsertOutcome>;

    /// Mark a certificate revoked. Returns `false` when no such certificate exists.
    async fn revoke_certificate(&self, serial: &str, subject_dn: &str) -> Result<bool>;
}
