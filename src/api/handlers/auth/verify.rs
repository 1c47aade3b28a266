use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};
use tracing::debug;

use super::types::VerifyResponse;
use crate::{error::AuthError, error::ErrorBody, tokens::Principal, trust::TrustContext};

#[utoipa::path(
    get,
    path = "/verify",
    responses(
        (status = 200, description = "Bearer token is valid", body = VerifyResponse),
        (status = 401, description = "Missing, invalid or expired bearer token", body = ErrorBody),
        (status = 403, description = "Insufficient trust", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn verify(
    principal: Option<Extension<Principal>>,
    trust: Option<Extension<TrustContext>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Extension(principal)) = principal else {
        return Err(AuthError::InvalidToken);
    };
    // Scores and factors stay in the logs; clients only learn the admitted level.
    let policy_level = trust.map(|Extension(context)| {
        debug!(
            user_id = %principal.user_id,
            score = context.score,
            factors = ?context.factor_names(),
            "Bearer verified"
        );
        context.policy_level
    });
    Ok(Json(VerifyResponse {
        user_id: principal.user_id,
        username: principal.username,
        role: principal.role,
        expires_at: principal.expires_at,
        policy_level,
    }))
}
