use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{info, warn};

use super::types::PasswordChangeRequest;
use crate::{
    api::AuthState,
    error::{AuthError, ErrorBody},
    password::{acceptable_password, hash_password_blocking, verify_password_blocking},
    tokens::{Principal, RevocationReason},
};

/// Change the caller's password. Every refresh token of the user, including the caller's,
/// is revoked before the new hash is stored.
#[utoipa::path(
    post,
    path = "/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed; all sessions revoked"),
        (status = 400, description = "New password rejected", body = ErrorBody),
        (status = 401, description = "Current password wrong or bearer token invalid", body = ErrorBody),
        (status = 403, description = "Insufficient trust", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    Extension(state): Extension<Arc<AuthState>>,
    principal: Option<Extension<Principal>>,
    payload: Option<Json<PasswordChangeRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Extension(principal)) = principal else {
        return Err(AuthError::InvalidToken);
    };
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("missing payload".to_string()));
    };

    let Some(user) = state.users().find_user(principal.user_id).await? else {
        return Err(AuthError::InvalidToken);
    };
    if !user.active {
        return Err(AuthError::AccountDisabled);
    }
    if !verify_password_blocking(request.current_password, user.password_hash).await? {
        warn!(user_id = %user.id, "Password change refused: current password mismatch");
        return Err(AuthError::InvalidCredentials);
    }
    if !acceptable_password(&request.new_password) {
        return Err(AuthError::BadRequest(
            "new password must be at least 12 characters".to_string(),
        ));
    }

    let new_hash = hash_password_blocking(request.new_password).await?;
    // Sessions go first: a failed revocation must leave the old password in place.
    state
        .tokens()
        .revoke_all_user_tokens(user.id, RevocationReason::PasswordChange)
        .await?;
    if !state.users().update_password_hash(user.id, &new_hash).await? {
        return Err(AuthError::InvalidToken);
    }

    info!(user_id = %user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}
