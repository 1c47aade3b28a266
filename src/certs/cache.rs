use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::store::ClientCertificateRecord;

type CacheKey = (String, String);

/// Short-lived cache of positive certificate lookups. Misses are never cached so a
/// newly registered certificate is usable immediately.
pub struct CertificateCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, (OffsetDateTime, ClientCertificateRecord)>>,
}

impl CertificateCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(
        &self,
        serial: &str,
        subject_dn: &str,
        now: OffsetDateTime,
    ) -> Option<ClientCertificateRecord> {
        if self.ttl <= Duration::ZERO {
            return None;
        }
        let entries = self.entries.read().await;
        let (cached_at, record) = entries.get(&(serial.to_string(), subject_dn.to_string()))?;
        (now - *cached_at < self.ttl).then(|| record.clone())
    }

    pub async fn put(&self, record: ClientCertificateRecord, now: OffsetDateTime) {
        if self.ttl <= Duration::ZERO {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.retain(|_, (cached_at, _)| now - *cached_at < self.ttl);
        entries.insert(
            (record.serial.clone(), record.subject_dn.clone()),
            (now, record),
        );
    }

    pub async fn evict(&self, serial: &str, subject_dn: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(&(serial.to_string(), subject_dn.to_string()));
    }
}
