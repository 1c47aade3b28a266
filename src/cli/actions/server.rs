use crate::{
    api::{self, AuthConfig, Environment},
    cli::telemetry,
    trust::TrustMode,
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub environment: Environment,
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub csrf_cookie_name: String,
    pub cookie_secure: bool,
    pub trust_mode: TrustMode,
    pub trust_standard_threshold: u8,
    pub trust_sensitive_threshold: u8,
    pub cert_allowed_issuers: Vec<String>,
    pub cert_cache_ttl_seconds: i64,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.frontend_base_url.clone())
            .with_environment(self.environment)
            .with_jwt_issuer(self.jwt_issuer.clone())
            .with_access_token_ttl_seconds(self.access_token_ttl_seconds)
            .with_refresh_token_ttl_seconds(self.refresh_token_ttl_seconds)
            .with_csrf_cookie_name(self.csrf_cookie_name.clone())
            .with_cookie_secure(self.cookie_secure)
            .with_trust_mode(self.trust_mode)
            .with_trust_thresholds(
                self.trust_standard_threshold,
                self.trust_sensitive_threshold,
            )
            .with_cert_allowed_issuers(self.cert_allowed_issuers.clone())
            .with_cert_cache_ttl_seconds(self.cert_cache_ttl_seconds)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the database is unreachable or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config();
    auth_config.validate()?;

    if !args.cookie_secure {
        warn!("CSRF cookie is not marked Secure");
    }

    debug!(
        environment = %args.environment,
        trust_mode = args.trust_mode.as_str(),
        issuers = args.cert_allowed_issuers.len(),
        "starting server"
    );

    let result = api::new(args.port, args.dsn, auth_config, args.jwt_secret).await;

    telemetry::shutdown_tracer();

    result
}
