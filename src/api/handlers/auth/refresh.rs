use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::warn;

use super::{
    issue_csrf,
    types::{RefreshRequest, RefreshResponse},
};
use crate::{
    api::AuthState,
    error::{AuthError, ErrorBody},
    tokens::{ClientContext, RotationOutcome},
};

#[utoipa::path(
    post,
    path = "/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh token rotated", body = RefreshResponse),
        (status = 400, description = "Missing payload", body = ErrorBody),
        (status = 401, description = "Invalid, expired or reused refresh token", body = ErrorBody),
        (status = 403, description = "CSRF check failed", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("missing payload".to_string()));
    };
    let client = ClientContext::from_headers(&headers);

    match state
        .tokens()
        .rotate_refresh_token(&request.refresh_token, &client)
        .await?
    {
        RotationOutcome::Rotated(pair) => {
            let (csrf_token, response_headers) = issue_csrf(&state)?;
            Ok((
                StatusCode::OK,
                response_headers,
                Json(RefreshResponse::new(pair, csrf_token)),
            ))
        }
        RotationOutcome::Rejected(rejection) => {
            warn!(reason = ?rejection, "Refresh rejected");
            Err(rejection.into())
        }
    }
}
