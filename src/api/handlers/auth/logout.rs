use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::types::{LogoutAllResponse, LogoutRequest};
use crate::{
    api::AuthState,
    error::{AuthError, ErrorBody},
    tokens::{Principal, RevocationReason},
};

/// Revokes the presented refresh token. With a valid bearer token every session of the
/// caller is revoked as well. Always 204, even for unknown tokens.
#[utoipa::path(
    post,
    path = "/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 403, description = "CSRF check failed", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(state): Extension<Arc<AuthState>>,
    principal: Option<Extension<Principal>>,
    payload: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    if let Some(refresh_token) = request.refresh_token.as_deref() {
        state.tokens().revoke_single_token(refresh_token).await?;
    }
    if let Some(Extension(principal)) = principal {
        state
            .tokens()
            .revoke_all_user_tokens(principal.user_id, RevocationReason::Logout)
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/logout-all",
    responses(
        (status = 200, description = "Every refresh token of the caller revoked", body = LogoutAllResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout_all(
    Extension(state): Extension<Arc<AuthState>>,
    principal: Option<Extension<Principal>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Extension(principal)) = principal else {
        return Err(AuthError::InvalidToken);
    };
    let revoked = state
        .tokens()
        .revoke_all_user_tokens(principal.user_id, RevocationReason::LogoutEverywhere)
        .await?;
    Ok((StatusCode::OK, Json(LogoutAllResponse { revoked })))
}
