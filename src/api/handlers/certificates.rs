//! Admin endpoints for PIV/CAC certificate registration.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::AuthState,
    certs::CertificateRegistration,
    error::{AuthError, ErrorBody},
    store::{CertificateStatus, ClientCertificateRecord, Role},
    tokens::Principal,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCertificateRequest {
    pub user_id: Uuid,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub serial: String,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CertificateView {
    pub user_id: Uuid,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub serial: String,
    pub edipi: String,
    pub status: CertificateStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
}

impl From<ClientCertificateRecord> for CertificateView {
    fn from(record: ClientCertificateRecord) -> Self {
        Self {
            user_id: record.user_id,
            subject_dn: record.subject_dn,
            issuer_dn: record.issuer_dn,
            serial: record.serial,
            edipi: record.edipi,
            status: record.status,
            not_before: record.not_before,
            not_after: record.not_after,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RevokeCertificateRequest {
    pub serial: String,
    pub subject_dn: String,
}

fn require_admin(principal: Option<Extension<Principal>>) -> Result<Principal, AuthError> {
    let Some(Extension(principal)) = principal else {
        return Err(AuthError::InvalidToken);
    };
    if principal.role != Role::Admin {
        warn!(user_id = %principal.user_id, "Certificate administration refused: not an admin");
        return Err(AuthError::Forbidden);
    }
    Ok(principal)
}

#[utoipa::path(
    post,
    path = "/certificates",
    request_body = RegisterCertificateRequest,
    responses(
        (status = 201, description = "Certificate registered", body = CertificateView),
        (status = 400, description = "Malformed certificate fields", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 403, description = "Not an admin or insufficient trust", body = ErrorBody),
        (status = 409, description = "Serial and subject already registered", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "certificates"
)]
pub async fn register_certificate(
    Extension(state): Extension<Arc<AuthState>>,
    principal: Option<Extension<Principal>>,
    payload: Option<Json<RegisterCertificateRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    require_admin(principal)?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("missing payload".to_string()));
    };
    if state.users().find_user(request.user_id).await?.is_none() {
        return Err(AuthError::BadRequest("unknown user".to_string()));
    }

    let record = state
        .certificates()
        .register(CertificateRegistration {
            user_id: request.user_id,
            subject_dn: request.subject_dn,
            issuer_dn: request.issuer_dn,
            serial: request.serial,
            not_before: request.not_before,
            not_after: request.not_after,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CertificateView::from(record))))
}

#[utoipa::path(
    post,
    path = "/certificates/revoke",
    request_body = RevokeCertificateRequest,
    responses(
        (status = 204, description = "Certificate revoked (idempotent)"),
        (status = 400, description = "Malformed subject DN", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 403, description = "Not an admin or insufficient trust", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "certificates"
)]
pub async fn revoke_certificate(
    Extension(state): Extension<Arc<AuthState>>,
    principal: Option<Extension<Principal>>,
    payload: Option<Json<RevokeCertificateRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    require_admin(principal)?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("missing payload".to_string()));
    };
    state
        .certificates()
        .revoke(&request.serial, &request.subject_dn)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
