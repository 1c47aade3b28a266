//! In-process store. One mutex guards all tables, which makes every rotation
//! serialized and trivially atomic.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CertificateInsertOutcome, CertificateStatus, CertificateStore, ClientCertificateRecord,
    RefreshTokenRecord, RefreshTokenStore, User, UserStore,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Vec<u8>, RefreshTokenRecord>,
    certificates: HashMap<(String, String), ClientCertificateRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        let mut tables = self.tables.lock().await;
        tables.users.insert(user.id, user);
    }

    pub async fn set_user_active(&self, user_id: Uuid, active: bool) {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.active = active;
        }
    }

    /// All records of a family, oldest first.
    pub async fn family(&self, family_id: Uuid) -> Vec<RefreshTokenRecord> {
        let tables = self.tables.lock().await;
        let mut records: Vec<RefreshTokenRecord> = tables
            .refresh_tokens
            .values()
            .filter(|record| record.family_id == family_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.issued_at);
        records
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&user_id).cloned())
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.get_mut(&user_id).is_some_and(|user| {
            user.password_hash = password_hash.to_string();
            true
        }))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &[u8]) -> Result<Option<RefreshTokenRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.refresh_tokens.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        current_hash: &[u8],
        successor: &RefreshTokenRecord,
        at: OffsetDateTime,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(current) = tables.refresh_tokens.get_mut(current_hash) else {
            return Ok(false);
        };
        if current.revoked_at.is_some() {
            return Ok(false);
        }
        current.revoked_at = Some(at);
        current.replaced_by_hash = Some(successor.token_hash.clone());
        tables
            .refresh_tokens
            .insert(successor.token_hash.clone(), successor.clone());
        Ok(true)
    }

    async fn revoke_refresh_token(&self, token_hash: &[u8], at: OffsetDateTime) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.refresh_tokens.get_mut(token_hash) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_family(&self, family_id: Uuid, at: OffsetDateTime) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut revoked = 0;
        for record in tables.refresh_tokens.values_mut() {
            if record.family_id == family_id && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_user_tokens(&self, user_id: Uuid, at: OffsetDateTime) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut revoked = 0;
        for record in tables.refresh_tokens.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn find_certificate(
        &self,
        serial: &str,
        subject_dn: &str,
    ) -> Result<Option<ClientCertificateRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .certificates
            .get(&(serial.to_string(), subject_dn.to_string()))
            .cloned())
    }

    async fn insert_certificate(
        &self,
        record: &ClientCertificateRecord,
    ) -> Result<CertificateInsertOutcome> {
        let mut tables = self.tables.lock().await;
        let key = (record.serial.clone(), record.subject_dn.clone());
        if tables.certificates.contains_key(&key) {
            return Ok(CertificateInsertOutcome::Conflict);
        }
        tables.certificates.insert(key, record.clone());
        Ok(CertificateInsertOutcome::Created)
    }

    async fn revoke_certificate(&self, serial: &str, subject_dn: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let key = (serial.to_string(), subject_dn.to_string());
        Ok(tables.certificates.get_mut(&key).is_some_and(|record| {
            record.status = CertificateStatus::Revoked;
            true
        }))
    }
}
