use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::{issue_csrf, types::CsrfTokenResponse};
use crate::{api::AuthState, error::AuthError};

#[utoipa::path(
    get,
    path = "/csrf-token",
    responses(
        (status = 200, description = "CSRF cookie set; echo the token in X-CSRF-Token", body = CsrfTokenResponse),
    ),
    tag = "auth"
)]
pub async fn csrf_token(
    Extension(state): Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let (csrf_token, headers) = issue_csrf(&state)?;
    Ok((StatusCode::OK, headers, Json(CsrfTokenResponse { csrf_token })))
}
