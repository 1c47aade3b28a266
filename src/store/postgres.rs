//! `PostgreSQL` adapter. Schema lives in `sql/schema.sql`.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    CertificateInsertOutcome, CertificateStore, ClientCertificateRecord, RefreshTokenRecord,
    RefreshTokenStore, User, UserStore,
};

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse().map_err(|err: String| anyhow!(err))?,
        active: row.get("active"),
    })
}

fn refresh_token_from_row(row: &PgRow) -> RefreshTokenRecord {
    RefreshTokenRecord {
        token_hash: row.get("token_hash"),
        user_id: row.get("user_id"),
        family_id: row.get("family_id"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        replaced_by_hash: row.get("replaced_by_hash"),
    }
}

fn certificate_from_row(row: &PgRow) -> Result<ClientCertificateRecord> {
    let status: String = row.get("status");
    Ok(ClientCertificateRecord {
        user_id: row.get("user_id"),
        subject_dn: row.get("subject_dn"),
        issuer_dn: row.get("issuer_dn"),
        serial: row.get("serial"),
        edipi: row.get("edipi"),
        status: status.parse().map_err(|err: String| anyhow!(err))?,
        not_before: row.get("not_before"),
        not_after: row.get("not_after"),
    })
}

const INSERT_REFRESH_TOKEN: &str = r"
    INSERT INTO refresh_tokens
        (token_hash, user_id, family_id, issued_at, expires_at)
    VALUES ($1, $2, $3, $4, $5)
";

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let query = r"
            SELECT id, username, email, password_hash, role::text AS role, active
            FROM users
            WHERE username = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by username")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = r"
            SELECT id, username, email, password_hash, role::text AS role, active
            FROM users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<bool> {
        let query = r"
            UPDATE users
            SET password_hash = $2,
                updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password hash")?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(&record.token_hash)
            .bind(record.user_id)
            .bind(record.family_id)
            .bind(record.issued_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", INSERT_REFRESH_TOKEN))
            .await
            .context("failed to insert refresh token")?;
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &[u8]) -> Result<Option<RefreshTokenRecord>> {
        let query = r"
            SELECT token_hash, user_id, family_id, issued_at, expires_at, revoked_at, replaced_by_hash
            FROM refresh_tokens
            WHERE token_hash = $1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?;
        Ok(row.as_ref().map(refresh_token_from_row))
    }

    async fn rotate_refresh_token(
        &self,
        current_hash: &[u8],
        successor: &RefreshTokenRecord,
        at: OffsetDateTime,
    ) -> Result<bool> {
        // The conditional UPDATE is the row-level compare-and-swap; the INSERT only
        // happens for the single writer that flipped revoked_at.
        let mut tx = self.pool.begin().await.context("begin rotation transaction")?;

        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2,
                replaced_by_hash = $3
            WHERE token_hash = $1
              AND revoked_at IS NULL
            RETURNING family_id
        ";
        let row = sqlx::query(query)
            .bind(current_hash)
            .bind(at)
            .bind(&successor.token_hash)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to supersede refresh token")?;

        if row.is_none() {
            tx.rollback()
                .await
                .context("failed to roll back refresh token rotation")?;
            return Ok(false);
        }

        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(&successor.token_hash)
            .bind(successor.user_id)
            .bind(successor.family_id)
            .bind(successor.issued_at)
            .bind(successor.expires_at)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", INSERT_REFRESH_TOKEN))
            .await
            .context("failed to insert successor refresh token")?;

        tx.commit().await.context("commit rotation transaction")?;
        Ok(true)
    }

    async fn revoke_refresh_token(&self, token_hash: &[u8], at: OffsetDateTime) -> Result<bool> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE token_hash = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_family(&self, family_id: Uuid, at: OffsetDateTime) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE family_id = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(family_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh token family")?;
        Ok(result.rows_affected())
    }

    async fn revoke_user_tokens(&self, user_id: Uuid, at: OffsetDateTime) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke user refresh tokens")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CertificateStore for PgStore {
    async fn find_certificate(
        &self,
        serial: &str,
        subject_dn: &str,
    ) -> Result<Option<ClientCertificateRecord>> {
        let query = r"
            SELECT user_id, subject_dn, issuer_dn, serial, edipi, status::text AS status,
                   not_before, not_after
            FROM client_certificates
            WHERE serial = $1
              AND subject_dn = $2
        ";
        let row = sqlx::query(query)
            .bind(serial)
            .bind(subject_dn)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup client certificate")?;
        row.as_ref().map(certificate_from_row).transpose()
    }

    async fn insert_certificate(
        &self,
        record: &ClientCertificateRecord,
    ) -> Result<CertificateInsertOutcome> {
        let query = r"
            INSERT INTO client_certificates
                (user_id, subject_dn, issuer_dn, serial, edipi, status, not_before, not_after)
            VALUES ($1, $2, $3, $4, $5, $6::certificate_status, $7, $8)
        ";
        let result = sqlx::query(query)
            .bind(record.user_id)
            .bind(&record.subject_dn)
            .bind(&record.issuer_dn)
            .bind(&record.serial)
            .bind(&record.edipi)
            .bind(record.status.as_str())
            .bind(record.not_before)
            .bind(record.not_after)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(CertificateInsertOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(CertificateInsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert client certificate"),
        }
    }

    async fn revoke_certificate(&self, serial: &str, subject_dn: &str) -> Result<bool> {
        let query = r"
            UPDATE client_certificates
            SET status = 'revoked',
                revoked_at = COALESCE(revoked_at, NOW())
            WHERE serial = $1
              AND subject_dn = $2
        ";
        let result = sqlx::query(query)
            .bind(serial)
            .bind(subject_dn)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke client certificate")?;
        Ok(result.rows_affected() == 1)
    }
}
