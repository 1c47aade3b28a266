//! PIV/CAC certificate adapter.
//!
//! TLS terminates at the reverse proxy, which forwards the verified client certificate
//! as `X-Client-Cert-*` headers. The adapter turns those headers into a strengthened
//! authentication signal for trust scoring. It never grants access on its own.
//!
//! Fail closed: no headers means no signal, but any presented certificate that cannot
//! be fully validated rejects the request.

mod cache;
pub mod dn;

pub use cache::CertificateCache;

use anyhow::{Result, anyhow};
use axum::http::HeaderMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AuthError,
    store::{CertificateInsertOutcome, CertificateStatus, CertificateStore, ClientCertificateRecord},
};
use dn::{extract_edipi, normalize_dn};

pub const HEADER_CERT_SUBJECT: &str = "x-client-cert-subject";
pub const HEADER_CERT_ISSUER: &str = "x-client-cert-issuer";
pub const HEADER_CERT_SERIAL: &str = "x-client-cert-serial";
pub const HEADER_CERT_VERIFY: &str = "x-client-cert-verify";

const VERIFY_SUCCESS: &str = "SUCCESS";

/// Raw certificate fields as forwarded by the proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateFields {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub serial: Option<String>,
    pub verify: Option<String>,
}

impl CertificateFields {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            subject: read(HEADER_CERT_SUBJECT),
            issuer: read(HEADER_CERT_ISSUER),
            serial: read(HEADER_CERT_SERIAL),
            verify: read(HEADER_CERT_VERIFY),
        }
    }

    fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.issuer.is_none()
            && self.serial.is_none()
            && self.verify.is_none()
    }
}

/// Verified certificate attached to the request for trust scoring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateIdentity {
    pub user_id: Uuid,
    pub edipi: String,
    pub serial: String,
    pub subject_dn: String,
}

/// Internal rejection reason, logged only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateRejection {
    IncompleteHeaders,
    VerificationFailed,
    MalformedSubject,
    MalformedIssuer,
    IssuerNotAllowed,
    MissingIdentifier,
    NotRegistered,
    Revoked,
    OutsideValidity,
    RecordMismatch,
}

impl CertificateRejection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncompleteHeaders => "incomplete_headers",
            Self::VerificationFailed => "verification_failed",
            Self::MalformedSubject => "malformed_subject",
            Self::MalformedIssuer => "malformed_issuer",
            Self::IssuerNotAllowed => "issuer_not_allowed",
            Self::MissingIdentifier => "missing_identifier",
            Self::NotRegistered => "not_registered",
            Self::Revoked => "revoked",
            Self::OutsideValidity => "outside_validity",
            Self::RecordMismatch => "record_mismatch",
        }
    }
}

/// Certificate registration request, already authorized by the caller.
#[derive(Clone, Debug)]
pub struct CertificateRegistration {
    pub user_id: Uuid,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub serial: String,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

pub struct CertificateAuthenticator {
    store: Arc<dyn CertificateStore>,
    allowed_issuers: Vec<String>,
    cache: CertificateCache,
    clock: Arc<dyn Clock>,
}

impl CertificateAuthenticator {
    /// # Errors
    /// Returns an error if an allowed issuer is not a parseable DN.
    pub fn new(
        store: Arc<dyn CertificateStore>,
        allowed_issuers: &[String],
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let allowed_issuers = allowed_issuers
            .iter()
            .map(|issuer| {
                normalize_dn(issuer).ok_or_else(|| anyhow!("invalid allowed issuer DN: {issuer}"))
            })
            .collect::<Result<Vec<_>>>()?;
        if allowed_issuers.is_empty() {
            warn!("No certificate issuers allowed; every presented client certificate will be rejected");
        }
        Ok(Self {
            store,
            allowed_issuers,
            cache: CertificateCache::new(cache_ttl),
            clock,
        })
    }

    /// Validate forwarded certificate fields.
    ///
    /// # Errors
    /// `CertificateRejected` for any presented certificate that fails validation,
    /// `Internal` for store failures.
    pub async fn authenticate(
        &self,
        fields: &CertificateFields,
    ) -> Result<Option<CertificateIdentity>, AuthError> {
        if fields.is_empty() {
            return Ok(None);
        }
        match self.validate(fields).await? {
            Ok(identity) => {
                debug!(user_id = %identity.user_id, serial = %identity.serial, "Client certificate accepted");
                Ok(Some(identity))
            }
            Err(rejection) => {
                warn!(
                    reason = rejection.as_str(),
                    serial = fields.serial.as_deref().unwrap_or_default(),
                    "Client certificate rejected"
                );
                Err(AuthError::CertificateRejected)
            }
        }
    }

    async fn validate(
        &self,
        fields: &CertificateFields,
    ) -> Result<Result<CertificateIdentity, CertificateRejection>> {
        let (Some(subject), Some(issuer), Some(serial), Some(verify)) = (
            fields.subject.as_deref(),
            fields.issuer.as_deref(),
            fields.serial.as_deref(),
            fields.verify.as_deref(),
        ) else {
            return Ok(Err(CertificateRejection::IncompleteHeaders));
        };

        if verify != VERIFY_SUCCESS {
            return Ok(Err(CertificateRejection::VerificationFailed));
        }
        let Some(issuer_dn) = normalize_dn(issuer) else {
            return Ok(Err(CertificateRejection::MalformedIssuer));
        };
        if !self.allowed_issuers.contains(&issuer_dn) {
            return Ok(Err(CertificateRejection::IssuerNotAllowed));
        }
        let Some(subject_dn) = normalize_dn(subject) else {
            return Ok(Err(CertificateRejection::MalformedSubject));
        };
        let Some(edipi) = extract_edipi(subject) else {
            return Ok(Err(CertificateRejection::MissingIdentifier));
        };
        let serial = normalize_serial(serial);

        let now = self.clock.now();
        let record = match self.cache.get(&serial, &subject_dn, now).await {
            Some(record) => record,
            None => match self.store.find_certificate(&serial, &subject_dn).await? {
                Some(record) => record,
                None => return Ok(Err(CertificateRejection::NotRegistered)),
            },
        };

        if record.status == CertificateStatus::Revoked {
            return Ok(Err(CertificateRejection::Revoked));
        }
        if !record.is_valid_at(now) {
            return Ok(Err(CertificateRejection::OutsideValidity));
        }
        if record.issuer_dn != issuer_dn || record.edipi != edipi {
            return Ok(Err(CertificateRejection::RecordMismatch));
        }

        let identity = CertificateIdentity {
            user_id: record.user_id,
            edipi,
            serial,
            subject_dn,
        };
        self.cache.put(record, now).await;
        Ok(Ok(identity))
    }

    /// Register a certificate for a user.
    ///
    /// # Errors
    /// `BadRequest` for malformed DNs or validity windows, `Conflict` on duplicates.
    pub async fn register(
        &self,
        registration: CertificateRegistration,
    ) -> Result<ClientCertificateRecord, AuthError> {
        let subject_dn = normalize_dn(&registration.subject_dn)
            .ok_or_else(|| AuthError::BadRequest("invalid subject DN".to_string()))?;
        let issuer_dn = normalize_dn(&registration.issuer_dn)
            .ok_or_else(|| AuthError::BadRequest("invalid issuer DN".to_string()))?;
        let edipi = extract_edipi(&registration.subject_dn).ok_or_else(|| {
            AuthError::BadRequest("subject CN carries no personnel identifier".to_string())
        })?;
        let serial = normalize_serial(&registration.serial);
        if serial.is_empty() {
            return Err(AuthError::BadRequest("serial is required".to_string()));
        }
        if registration.not_after <= registration.not_before {
            return Err(AuthError::BadRequest(
                "notAfter must be later than notBefore".to_string(),
            ));
        }

        let record = ClientCertificateRecord {
            user_id: registration.user_id,
            subject_dn,
            issuer_dn,
            serial,
            edipi,
            status: CertificateStatus::Active,
            not_before: registration.not_before,
            not_after: registration.not_after,
        };
        match self.store.insert_certificate(&record).await? {
            CertificateInsertOutcome::Created => {
                info!(user_id = %record.user_id, serial = %record.serial, "Client certificate registered");
                Ok(record)
            }
            CertificateInsertOutcome::Conflict => Err(AuthError::Conflict),
        }
    }

    /// Revoke a certificate and drop it from the local cache. Unknown certificates are a
    /// no-op.
    ///
    /// # Errors
    /// `BadRequest` for a malformed subject, `Internal` for store failures.
    pub async fn revoke(&self, serial: &str, subject_dn: &str) -> Result<bool, AuthError> {
        let subject_dn = normalize_dn(subject_dn)
            .ok_or_else(|| AuthError::BadRequest("invalid subject DN".to_string()))?;
        let serial = normalize_serial(serial);
        let revoked = self.store.revoke_certificate(&serial, &subject_dn).await?;
        self.cache.evict(&serial, &subject_dn).await;
        info!(serial = %serial, revoked, "Client certificate revocation");
        Ok(revoked)
    }
}

/// Hex serials arrive with or without colons and in either case.
fn normalize_serial(serial: &str) -> String {
    serial
        .trim()
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_uppercase()
}
