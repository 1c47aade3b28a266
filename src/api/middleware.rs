//! Request security pipeline.
//!
//! Applied as route layers so `MatchedPath` is available. Runs, outermost first:
//! certificate, bearer, trust, CSRF. Each stage only adds request extensions or
//! rejects; none of them touches the response of an accepted request.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::AuthState;
use crate::{
    certs::{CertificateFields, CertificateIdentity},
    error::AuthError,
    tokens::{ClientContext, Principal, extract_bearer_token, utils::fingerprint_user_agent},
    trust::{PolicyLevel, TrustDecision, TrustSignals, compute_trust_score},
};

pub async fn certificate(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let fields = CertificateFields::from_headers(request.headers());
    match state.certificates().authenticate(&fields).await {
        Ok(Some(identity)) => {
            request.extensions_mut().insert(identity);
        }
        Ok(None) => {}
        Err(err) => return err.into_response(),
    }
    next.run(request).await
}

/// An invalid bearer token is not rejected here; the request simply stays anonymous
/// and the trust stage decides.
pub async fn bearer(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(request.headers()) {
        match state.tokens().verify_access_token(&token) {
            Ok(principal) => {
                request.extensions_mut().insert(principal);
            }
            Err(err) => debug!(reason = ?err, "Ignoring invalid bearer token"),
        }
    }
    next.run(request).await
}

pub async fn trust(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());
    let level = state.trust().level_for(&path);
    if level == PolicyLevel::Public {
        return next.run(request).await;
    }

    let principal = request.extensions().get::<Principal>().cloned();
    let identity = request.extensions().get::<CertificateIdentity>().cloned();

    if let (Some(principal), Some(identity)) = (&principal, &identity) {
        if principal.user_id != identity.user_id {
            warn!(
                user_id = %principal.user_id,
                certificate_user_id = %identity.user_id,
                serial = %identity.serial,
                "Client certificate bound to a different user than the bearer token"
            );
            return AuthError::CertificateRejected.into_response();
        }
    }

    let client = ClientContext::from_headers(request.headers());
    let signals = TrustSignals {
        authenticated: principal.is_some(),
        strong_auth: identity.is_some(),
        token_ip: principal.as_ref().and_then(|p| p.issued_ip.clone()),
        token_fingerprint: principal.as_ref().and_then(|p| p.device_fingerprint.clone()),
        request_ip: client.ip,
        request_fingerprint: client.user_agent.as_deref().map(fingerprint_user_agent),
    };
    let context = compute_trust_score(&signals, level);
    let threshold = state.trust().threshold(level);

    match state.trust().decide(&context) {
        TrustDecision::Allow => {}
        TrustDecision::AllowAudited => {
            warn!(
                path = %path,
                score = context.score,
                threshold,
                factors = ?context.factor_names(),
                "AUDIT MODE: request below trust threshold allowed"
            );
        }
        TrustDecision::Deny => {
            warn!(
                path = %path,
                score = context.score,
                threshold,
                factors = ?context.factor_names(),
                authenticated = principal.is_some(),
                "Request rejected: insufficient trust"
            );
            return if principal.is_some() {
                AuthError::InsufficientTrust.into_response()
            } else {
                AuthError::InvalidToken.into_response()
            };
        }
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

pub async fn csrf(State(state): State<Arc<AuthState>>, request: Request, next: Next) -> Response {
    let bearer_authenticated = request.extensions().get::<Principal>().is_some();
    if let Err(failure) =
        state
            .csrf()
            .protect(request.method(), request.headers(), bearer_authenticated)
    {
        warn!(
            method = %request.method(),
            path = %request.uri().path(),
            reason = failure.as_str(),
            "CSRF check failed"
        );
        return AuthError::from(failure).into_response();
    }
    next.run(request).await
}
