use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    issue_csrf,
    types::{LoginRequest, LoginResponse, UserView},
};
use crate::{
    api::AuthState,
    error::{AuthError, ErrorBody},
    password::verify_password_blocking,
    tokens::ClientContext,
};

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; token pair issued", body = LoginResponse),
        (status = 400, description = "Missing payload", body = ErrorBody),
        (status = 401, description = "Invalid credentials or disabled account", body = ErrorBody),
        (status = 403, description = "CSRF check failed", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("missing payload".to_string()));
    };
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let user = state.users().find_user_by_username(username).await?;
    let stored_hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => state.dummy_password_hash().to_string(),
    };
    let verified = verify_password_blocking(request.password, stored_hash).await?;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!(username = %username, "Login failed: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }
    };
    if !user.active {
        warn!(user_id = %user.id, "Login refused: account disabled");
        return Err(AuthError::AccountDisabled);
    }

    let client = ClientContext::from_headers(&headers);
    let pair = state.tokens().issue_token_pair(&user, &client).await?;
    let (csrf_token, response_headers) = issue_csrf(&state)?;

    info!(user_id = %user.id, ip = client.ip.as_deref().unwrap_or("unknown"), "Login succeeded");

    let body = LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        csrf_token,
        user: UserView {
            id: user.id,
            username: user.username,
            role: user.role,
        },
    };
    Ok((StatusCode::OK, response_headers, Json(body)))
}
