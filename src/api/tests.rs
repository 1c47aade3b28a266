//! Router-level tests: the full security pipeline against the in-memory store.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::SET_COOKIE},
    response::Response,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use super::{AuthConfig, AuthState, Environment, Stores, router};
use crate::{
    certs::{CertificateRegistration, HEADER_CERT_ISSUER, HEADER_CERT_SERIAL, HEADER_CERT_SUBJECT, HEADER_CERT_VERIFY},
    clock::{Clock, ManualClock},
    csrf::CSRF_HEADER_NAME,
    error::{
        CODE_ACCOUNT_DISABLED, CODE_CERTIFICATE_REJECTED, CODE_CONFLICT, CODE_CSRF_MISMATCH,
        CODE_FORBIDDEN, CODE_INSUFFICIENT_TRUST, CODE_INVALID_CREDENTIALS, CODE_INVALID_OR_EXPIRED,
    },
    password::hash_password,
    store::{MemoryStore, RefreshTokenRecord, RefreshTokenStore, Role, User},
    trust::TrustMode,
};

const USER_AGENT: &str = "trustgate-tests/1.0";
const PASSWORD: &str = "correct horse battery";
const ISSUER: &str = "CN=DOD ID CA-59,OU=PKI,OU=DoD,O=U.S. Government,C=US";
const ALICE_SUBJECT: &str = "CN=DOE.ALICE.A.1234567890,OU=USA,OU=PKI,OU=DoD,O=U.S. Government,C=US";
const ADMIN_SUBJECT: &str = "CN=ROOT.ADA.B.1098765432,OU=USA,OU=PKI,OU=DoD,O=U.S. Government,C=US";

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    state: Arc<AuthState>,
    alice: User,
    admin: User,
}

fn user(username: &str, role: Role) -> Result<User> {
    Ok(User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password_hash: hash_password(PASSWORD)?,
        role,
        active: true,
    })
}

async fn test_app_with(config: AuthConfig) -> Result<TestApp> {
    let store = Arc::new(MemoryStore::new());
    test_app_from(config, store.clone(), Stores::shared(store)).await
}

async fn test_app_from(config: AuthConfig, store: Arc<MemoryStore>, stores: Stores) -> Result<TestApp> {
    let clock = Arc::new(ManualClock::new(OffsetDateTime::from_unix_timestamp(
        1_700_000_000,
    )?));
    let alice = user("alice", Role::User)?;
    let admin = user("ada", Role::Admin)?;
    store.insert_user(alice.clone()).await;
    store.insert_user(admin.clone()).await;

    let state = Arc::new(AuthState::new(
        config.with_cert_allowed_issuers(vec![ISSUER.to_string()]),
        &SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
        stores,
        clock.clone(),
    )?);

    let now = clock.now();
    for (owner, subject, serial) in [(&alice, ALICE_SUBJECT, "0A01"), (&admin, ADMIN_SUBJECT, "0B02")] {
        state
            .certificates()
            .register(CertificateRegistration {
                user_id: owner.id,
                subject_dn: subject.to_string(),
                issuer_dn: ISSUER.to_string(),
                serial: serial.to_string(),
                not_before: now - Duration::days(1),
                not_after: now + Duration::days(365),
            })
            .await
            .map_err(|err| anyhow!("register certificate: {err}"))?;
    }

    Ok(TestApp {
        app: router(state.clone()),
        store,
        clock,
        state,
        alice,
        admin,
    })
}

async fn test_app() -> Result<TestApp> {
    test_app_with(AuthConfig::new("https://app.example.com".to_string())).await
}

/// Refresh token store whose bulk revocation always fails.
struct FailingBulkRevocation(Arc<MemoryStore>);

#[async_trait]
impl RefreshTokenStore for FailingBulkRevocation {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        self.0.insert_refresh_token(record).await
    }

    async fn find_refresh_token(&self, token_hash: &[u8]) -> Result<Option<RefreshTokenRecord>> {
        self.0.find_refresh_token(token_hash).await
    }

    async fn rotate_refresh_token(
        &self,
        current_hash: &[u8],
        successor: &RefreshTokenRecord,
        at: OffsetDateTime,
    ) -> Result<bool> {
        self.0.rotate_refresh_token(current_hash, successor, at).await
    }

    async fn revoke_refresh_token(&self, token_hash: &[u8], at: OffsetDateTime) -> Result<bool> {
        self.0.revoke_refresh_token(token_hash, at).await
    }

    async fn revoke_family(&self, family_id: Uuid, at: OffsetDateTime) -> Result<u64> {
        self.0.revoke_family(family_id, at).await
    }

    async fn revoke_user_tokens(&self, _user_id: Uuid, _at: OffsetDateTime) -> Result<u64> {
        Err(anyhow!("refresh token store unavailable"))
    }
}

/// Header set for one request.
#[derive(Default, Clone)]
struct Headers(Vec<(&'static str, String)>);

impl Headers {
    fn browser() -> Self {
        Self(vec![("user-agent", USER_AGENT.to_string())])
    }

    fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.0.push((name, value.into()));
        self
    }

    fn bearer(self, token: &str) -> Self {
        self.with("authorization", format!("Bearer {token}"))
    }

    fn csrf(self, token: &str) -> Self {
        self.with("cookie", format!("csrf_token={token}"))
            .with(CSRF_HEADER_NAME, token)
    }

    fn certificate(self, subject: &str, serial: &str) -> Self {
        self.with(HEADER_CERT_SUBJECT, subject)
            .with(HEADER_CERT_ISSUER, ISSUER)
            .with(HEADER_CERT_SERIAL, serial)
            .with(HEADER_CERT_VERIFY, "SUCCESS")
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &Headers,
    body: Option<Value>,
) -> Result<Response> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in &headers.0 {
        builder = builder.header(*name, value.as_str());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    Ok(app.clone().oneshot(request).await?)
}

async fn json_body(response: Response) -> Result<Value> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    serde_json::from_slice(&body).context("response body is not JSON")
}

async fn error_code(response: Response) -> Result<String> {
    let body = json_body(response).await?;
    body["code"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing error code in {body}"))
}

fn field(body: &Value, name: &str) -> Result<String> {
    body[name]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing {name} in {body}"))
}

async fn fetch_csrf(app: &Router) -> Result<String> {
    let response = send(app, Method::GET, "/csrf-token", &Headers::browser(), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    field(&json_body(response).await?, "csrfToken")
}

/// Log in and return the response body (`accessToken`, `refreshToken`, `csrfToken`, ...).
async fn login(app: &Router, username: &str, password: &str) -> Result<Value> {
    login_as(app, Headers::browser(), username, password).await
}

async fn login_as(app: &Router, client: Headers, username: &str, password: &str) -> Result<Value> {
    let csrf = fetch_csrf(app).await?;
    let response = send(
        app,
        Method::POST,
        "/login",
        &client.csrf(&csrf),
        Some(json!({ "username": username, "password": password })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

async fn refresh(app: &Router, refresh_token: &str, csrf: &str) -> Result<Response> {
    send(
        app,
        Method::POST,
        "/refresh",
        &Headers::browser().csrf(csrf),
        Some(json!({ "refreshToken": refresh_token })),
    )
    .await
}

#[tokio::test]
async fn login_refresh_reuse_scenario() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let token1 = field(&session, "refreshToken")?;
    let csrf = field(&session, "csrfToken")?;
    assert_eq!(session["expiresIn"], 900);
    assert_eq!(session["user"]["username"], "alice");

    let response = refresh(&t.app, &token1, &csrf).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = json_body(response).await?;
    let token2 = field(&rotated, "refreshToken")?;
    assert_ne!(token1, token2);

    let response = refresh(&t.app, &token1, &csrf).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_INVALID_OR_EXPIRED);

    let response = refresh(&t.app, &token2, &csrf).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_INVALID_OR_EXPIRED);
    Ok(())
}

#[tokio::test]
async fn login_sets_readable_csrf_cookie() -> Result<()> {
    let t = test_app().await?;
    let csrf = fetch_csrf(&t.app).await?;
    let response = send(
        &t.app,
        Method::POST,
        "/login",
        &Headers::browser().csrf(&csrf),
        Some(json!({ "username": "alice", "password": PASSWORD })),
    )
    .await?;
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing set-cookie"))?;
    let body = json_body(response).await?;
    assert!(cookie.starts_with(&format!("csrf_token={};", field(&body, "csrfToken")?)));
    assert!(!cookie.contains("HttpOnly"));
    Ok(())
}

#[tokio::test]
async fn login_failures() -> Result<()> {
    let t = test_app().await?;
    let csrf = fetch_csrf(&t.app).await?;
    for (username, password) in [("alice", "wrong password!!"), ("nobody", PASSWORD)] {
        let response = send(
            &t.app,
            Method::POST,
            "/login",
            &Headers::browser().csrf(&csrf),
            Some(json!({ "username": username, "password": password })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await?, CODE_INVALID_CREDENTIALS);
    }

    t.store.set_user_active(t.alice.id, false).await;
    let response = send(
        &t.app,
        Method::POST,
        "/login",
        &Headers::browser().csrf(&csrf),
        Some(json!({ "username": "alice", "password": PASSWORD })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_ACCOUNT_DISABLED);
    Ok(())
}

#[tokio::test]
async fn csrf_double_submit() -> Result<()> {
    let t = test_app().await?;
    let body = Some(json!({ "refreshToken": "unknown" }));

    let cookie_only = Headers::browser().with("cookie", "csrf_token=abc");
    let response = send(&t.app, Method::POST, "/logout", &cookie_only, body.clone()).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await?, CODE_CSRF_MISMATCH);

    let mismatched = cookie_only.clone().with(CSRF_HEADER_NAME, "abd");
    let response = send(&t.app, Method::POST, "/logout", &mismatched, body.clone()).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let matching = Headers::browser().csrf("abc");
    let response = send(&t.app, Method::POST, "/logout", &matching, body.clone()).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let session = login(&t.app, "alice", PASSWORD).await?;
    let bearer_only = Headers::browser().bearer(&field(&session, "accessToken")?);
    let response = send(&t.app, Method::POST, "/logout", &bearer_only, body).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn logout_is_idempotent() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let token = field(&session, "refreshToken")?;
    let csrf = field(&session, "csrfToken")?;
    for _ in 0..2 {
        let response = send(
            &t.app,
            Method::POST,
            "/logout",
            &Headers::browser().csrf(&csrf),
            Some(json!({ "refreshToken": token })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    let response = refresh(&t.app, &token, &csrf).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_with_bearer_revokes_every_session() -> Result<()> {
    let t = test_app().await?;
    let laptop = login(&t.app, "alice", PASSWORD).await?;
    let phone = login(&t.app, "alice", PASSWORD).await?;
    let response = send(
        &t.app,
        Method::POST,
        "/logout",
        &Headers::browser().bearer(&field(&laptop, "accessToken")?),
        Some(json!({ "refreshToken": field(&laptop, "refreshToken")? })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let csrf = field(&phone, "csrfToken")?;
    let response = refresh(&t.app, &field(&phone, "refreshToken")?, &csrf).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_all_reports_revoked_count() -> Result<()> {
    let t = test_app().await?;
    let first = login(&t.app, "alice", PASSWORD).await?;
    login(&t.app, "alice", PASSWORD).await?;
    let response = send(
        &t.app,
        Method::POST,
        "/logout-all",
        &Headers::browser().bearer(&field(&first, "accessToken")?),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["revoked"], 2);

    let response = send(&t.app, Method::POST, "/logout-all", &Headers::browser().csrf("x"), None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn verify_returns_principal_without_trust_detail() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let access = field(&session, "accessToken")?;

    let response = send(&t.app, Method::GET, "/verify", &Headers::browser().bearer(&access), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["userId"], t.alice.id.to_string());
    assert_eq!(body["role"], "user");
    assert_eq!(body["policyLevel"], "standard");
    for internal in ["trustScore", "trustFactors"] {
        assert!(body.get(internal).is_none(), "{internal} leaked in {body}");
    }

    let response = send(&t.app, Method::GET, "/verify", &Headers::browser(), None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &t.app,
        Method::GET,
        "/verify",
        &Headers::browser().bearer(&format!("{access}x")),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_INVALID_OR_EXPIRED);
    Ok(())
}

#[tokio::test]
async fn verify_rejects_expired_access_token() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let access = field(&session, "accessToken")?;
    t.clock.advance(Duration::minutes(15));
    let response = send(&t.app, Method::GET, "/verify", &Headers::browser().bearer(&access), None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn client_without_user_agent_passes_standard_routes() -> Result<()> {
    let t = test_app().await?;
    let session = login_as(&t.app, Headers::default(), "alice", PASSWORD).await?;
    let headers = Headers::default().bearer(&field(&session, "accessToken")?);
    let response = send(&t.app, Method::GET, "/verify", &headers, None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn network_jump_alone_does_not_block_bearer() -> Result<()> {
    let t = test_app().await?;
    let session = login_as(
        &t.app,
        Headers::browser().with("x-forwarded-for", "10.0.0.1"),
        "alice",
        PASSWORD,
    )
    .await?;
    let headers = Headers::browser()
        .with("x-forwarded-for", "203.0.113.9")
        .bearer(&field(&session, "accessToken")?);
    let response = send(&t.app, Method::GET, "/verify", &headers, None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn changed_user_agent_does_not_block_bearer() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let headers = Headers::default()
        .with("user-agent", "curl/8.0")
        .bearer(&field(&session, "accessToken")?);
    let response = send(&t.app, Method::GET, "/verify", &headers, None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn audit_mode_logs_instead_of_blocking() -> Result<()> {
    let t = test_app_with(
        AuthConfig::new("https://app.example.com".to_string())
            .with_environment(Environment::Development)
            .with_trust_mode(TrustMode::Audit),
    )
    .await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let headers = Headers::browser().bearer(&field(&session, "accessToken")?);
    // Bearer alone is below the sensitive threshold; audit lets the handler answer.
    let response = send(
        &t.app,
        Method::POST,
        "/password",
        &headers,
        Some(json!({ "currentPassword": "not the password", "newPassword": "a much longer passphrase" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_INVALID_CREDENTIALS);
    Ok(())
}

#[tokio::test]
async fn password_change_requires_certificate_and_revokes_sessions() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let other = login(&t.app, "alice", PASSWORD).await?;
    let access = field(&session, "accessToken")?;
    let body = json!({ "currentPassword": PASSWORD, "newPassword": "a much longer passphrase" });

    let response = send(
        &t.app,
        Method::POST,
        "/password",
        &Headers::browser().bearer(&access),
        Some(body.clone()),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await?, CODE_INSUFFICIENT_TRUST);

    let strong = Headers::browser().bearer(&access).certificate(ALICE_SUBJECT, "0A01");
    let response = send(&t.app, Method::POST, "/password", &strong, Some(body)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for previous in [&session, &other] {
        let response = refresh(
            &t.app,
            &field(previous, "refreshToken")?,
            &field(previous, "csrfToken")?,
        )
        .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    login(&t.app, "alice", "a much longer passphrase").await?;
    Ok(())
}

#[tokio::test]
async fn failed_revocation_keeps_old_password() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores {
        refresh_tokens: Arc::new(FailingBulkRevocation(store.clone())),
        ..Stores::shared(store.clone())
    };
    let t = test_app_from(AuthConfig::new("https://app.example.com".to_string()), store, stores).await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let strong = Headers::browser()
        .bearer(&field(&session, "accessToken")?)
        .certificate(ALICE_SUBJECT, "0A01");
    let response = send(
        &t.app,
        Method::POST,
        "/password",
        &strong,
        Some(json!({ "currentPassword": PASSWORD, "newPassword": "a much longer passphrase" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    login(&t.app, "alice", PASSWORD).await?;
    Ok(())
}

#[tokio::test]
async fn password_change_checks_current_password() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let strong = Headers::browser()
        .bearer(&field(&session, "accessToken")?)
        .certificate(ALICE_SUBJECT, "0A01");
    let response = send(
        &t.app,
        Method::POST,
        "/password",
        &strong,
        Some(json!({ "currentPassword": "not the password", "newPassword": "a much longer passphrase" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_INVALID_CREDENTIALS);
    Ok(())
}

#[tokio::test]
async fn certificate_of_another_user_is_rejected() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    let headers = Headers::browser()
        .bearer(&field(&session, "accessToken")?)
        .certificate(ADMIN_SUBJECT, "0B02");
    let response = send(&t.app, Method::GET, "/verify", &headers, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_CERTIFICATE_REJECTED);
    Ok(())
}

#[tokio::test]
async fn invalid_certificate_fails_closed_even_on_public_routes() -> Result<()> {
    let t = test_app().await?;
    let headers = Headers::browser()
        .with(HEADER_CERT_SUBJECT, ALICE_SUBJECT)
        .with(HEADER_CERT_ISSUER, ISSUER)
        .with(HEADER_CERT_SERIAL, "0A01")
        .with(HEADER_CERT_VERIFY, "FAILED:certificate has expired");
    let response = send(&t.app, Method::GET, "/health", &headers, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_CERTIFICATE_REJECTED);

    let response = send(&t.app, Method::GET, "/health", &Headers::browser(), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn certificate_alone_does_not_authenticate() -> Result<()> {
    let t = test_app().await?;
    let headers = Headers::browser().certificate(ALICE_SUBJECT, "0A01");
    let response = send(&t.app, Method::GET, "/verify", &headers, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn certificate_administration_is_admin_only() -> Result<()> {
    let t = test_app().await?;
    let now = t.clock.now();
    let registration = json!({
        "userId": t.alice.id,
        "subjectDn": "CN=DOE.ALICE.A.1234567890,OU=Backup,O=U.S. Government,C=US",
        "issuerDn": ISSUER,
        "serial": "0C03",
        "notBefore": "2023-01-01T00:00:00Z",
        "notAfter": "2030-01-01T00:00:00Z",
    });
    assert!(now.year() >= 2023);

    let alice = login(&t.app, "alice", PASSWORD).await?;
    let headers = Headers::browser()
        .bearer(&field(&alice, "accessToken")?)
        .certificate(ALICE_SUBJECT, "0A01");
    let response = send(&t.app, Method::POST, "/certificates", &headers, Some(registration.clone())).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await?, CODE_FORBIDDEN);

    let admin = login(&t.app, "ada", PASSWORD).await?;
    let headers = Headers::browser()
        .bearer(&field(&admin, "accessToken")?)
        .certificate(ADMIN_SUBJECT, "0B02");
    let response = send(&t.app, Method::POST, "/certificates", &headers, Some(registration.clone())).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await?;
    assert_eq!(created["edipi"], "1234567890");
    assert_eq!(created["status"], "active");

    let response = send(&t.app, Method::POST, "/certificates", &headers, Some(registration)).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await?, CODE_CONFLICT);
    Ok(())
}

#[tokio::test]
async fn revoked_certificate_is_rejected_immediately() -> Result<()> {
    let t = test_app().await?;
    let alice = login(&t.app, "alice", PASSWORD).await?;
    let alice_headers = Headers::browser()
        .bearer(&field(&alice, "accessToken")?)
        .certificate(ALICE_SUBJECT, "0A01");
    let response = send(&t.app, Method::GET, "/verify", &alice_headers, None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["policyLevel"], "standard");

    let admin = login(&t.app, "ada", PASSWORD).await?;
    let admin_headers = Headers::browser()
        .bearer(&field(&admin, "accessToken")?)
        .certificate(ADMIN_SUBJECT, "0B02");
    for _ in 0..2 {
        let response = send(
            &t.app,
            Method::POST,
            "/certificates/revoke",
            &admin_headers,
            Some(json!({ "serial": "0A01", "subjectDn": ALICE_SUBJECT })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = send(&t.app, Method::GET, "/verify", &alice_headers, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_CERTIFICATE_REJECTED);
    Ok(())
}

#[tokio::test]
async fn disabled_user_cannot_refresh() -> Result<()> {
    let t = test_app().await?;
    let session = login(&t.app, "alice", PASSWORD).await?;
    t.store.set_user_active(t.alice.id, false).await;
    let response = refresh(
        &t.app,
        &field(&session, "refreshToken")?,
        &field(&session, "csrfToken")?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, CODE_INVALID_OR_EXPIRED);
    Ok(())
}

#[tokio::test]
async fn state_exposes_configured_ttls() -> Result<()> {
    let t = test_app().await?;
    assert_eq!(t.state.tokens().access_ttl_seconds(), 900);
    assert_eq!(t.state.config().refresh_token_ttl_seconds(), 604_800);
    assert_eq!(t.admin.role, Role::Admin);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let t = test_app().await?;
    let response = send(&t.app, Method::GET, "/api-docs/openapi.json", &Headers::default(), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert!(body["paths"]["/refresh"].is_object());
    Ok(())
}
