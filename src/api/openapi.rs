use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use super::handlers::{auth, certificates, health};
use crate::error::ErrorBody;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::refresh::refresh,
        auth::logout::logout,
        auth::logout::logout_all,
        auth::verify::verify,
        auth::password::change_password,
        auth::csrf_token::csrf_token,
        certificates::register_certificate,
        certificates::revoke_certificate,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        auth::types::UserView,
        auth::types::RefreshRequest,
        auth::types::RefreshResponse,
        auth::types::LogoutRequest,
        auth::types::LogoutAllResponse,
        auth::types::PasswordChangeRequest,
        auth::types::VerifyResponse,
        auth::types::CsrfTokenResponse,
        certificates::RegisterCertificateRequest,
        certificates::RevokeCertificateRequest,
        certificates::CertificateView,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Token issuance, rotation and revocation"),
        (name = "certificates", description = "PIV/CAC certificate registration"),
        (name = "health", description = "Liveness"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
