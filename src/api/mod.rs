//! HTTP surface: router wiring, security pipeline and server startup.

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::from_fn_with_state,
    routing::{get, post},
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod middleware;
mod openapi;
mod state;

#[cfg(test)]
mod tests;

pub use openapi::openapi;
pub use state::{AuthConfig, AuthState, Environment, Stores};

use crate::{clock::SystemClock, csrf::CSRF_HEADER_NAME, store::PgStore};
use handlers::{auth, certificates, health};

/// Routes behind the security pipeline plus the OpenAPI UI.
#[must_use]
pub fn router(state: Arc<AuthState>) -> Router {
    // route_layer: the last one added runs first.
    let secured = Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/login", post(auth::login::login))
        .route("/refresh", post(auth::refresh::refresh))
        .route("/logout", post(auth::logout::logout))
        .route("/logout-all", post(auth::logout::logout_all))
        .route("/verify", get(auth::verify::verify))
        .route("/password", post(auth::password::change_password))
        .route("/csrf-token", get(auth::csrf_token::csrf_token))
        .route("/certificates", post(certificates::register_certificate))
        .route("/certificates/revoke", post(certificates::revoke_certificate))
        .route_layer(from_fn_with_state(state.clone(), middleware::csrf))
        .route_layer(from_fn_with_state(state.clone(), middleware::trust))
        .route_layer(from_fn_with_state(state.clone(), middleware::bearer))
        .route_layer(from_fn_with_state(state.clone(), middleware::certificate));

    secured
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(Extension(state))
}

/// Start the server
/// # Errors
/// Return error if the database is unreachable, the configuration is invalid or the
/// listener fails
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    jwt_secret: SecretString,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let frontend_origin = frontend_origin(auth_config.frontend_base_url())?;
    let store = Arc::new(PgStore::new(pool));
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        &jwt_secret,
        Stores::shared(store),
        Arc::new(SystemClock),
    )?);

    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(CSRF_HEADER_NAME),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router(auth_state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
