//! Shared state for the security pipeline and its endpoints.

use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use std::{fmt, str::FromStr, sync::Arc};
use time::Duration;
use tracing::warn;

use crate::{
    certs::CertificateAuthenticator,
    clock::Clock,
    csrf::{CsrfGuard, DEFAULT_CSRF_COOKIE_NAME},
    password::hash_password,
    store::{CertificateStore, RefreshTokenStore, UserStore},
    tokens::{AccessTokenCodec, TokenService},
    trust::{TrustMode, TrustPolicy},
};

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_JWT_ISSUER: &str = "trustgate";
const DEFAULT_CERT_CACHE_TTL_SECONDS: i64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    environment: Environment,
    jwt_issuer: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    csrf_cookie_name: String,
    cookie_secure: bool,
    trust_mode: TrustMode,
    trust_standard_threshold: u8,
    trust_sensitive_threshold: u8,
    cert_allowed_issuers: Vec<String>,
    cert_cache_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            environment: Environment::Production,
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            csrf_cookie_name: DEFAULT_CSRF_COOKIE_NAME.to_string(),
            cookie_secure: true,
            trust_mode: TrustMode::Enforce,
            trust_standard_threshold: 50,
            trust_sensitive_threshold: 75,
            cert_allowed_issuers: Vec::new(),
            cert_cache_ttl_seconds: DEFAULT_CERT_CACHE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_jwt_issuer(mut self, issuer: String) -> Self {
        self.jwt_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_csrf_cookie_name(mut self, name: String) -> Self {
        self.csrf_cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_trust_mode(mut self, mode: TrustMode) -> Self {
        self.trust_mode = mode;
        self
    }

    #[must_use]
    pub fn with_trust_thresholds(mut self, standard: u8, sensitive: u8) -> Self {
        self.trust_standard_threshold = standard;
        self.trust_sensitive_threshold = sensitive;
        self
    }

    #[must_use]
    pub fn with_cert_allowed_issuers(mut self, issuers: Vec<String>) -> Self {
        self.cert_allowed_issuers = issuers;
        self
    }

    #[must_use]
    pub fn with_cert_cache_ttl_seconds(mut self, seconds: i64) -> Self {
        self.cert_cache_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn trust_mode(&self) -> TrustMode {
        self.trust_mode
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    /// Refuse combinations that must never reach production.
    ///
    /// # Errors
    /// Returns an error for audit trust mode in production or non-positive TTLs.
    pub fn validate(&self) -> Result<()> {
        if self.trust_mode == TrustMode::Audit && self.environment == Environment::Production {
            return Err(anyhow!(
                "trust mode 'audit' is not allowed when environment is 'production'"
            ));
        }
        if self.refresh_token_ttl_seconds <= 0 {
            return Err(anyhow!("refresh token ttl must be positive"));
        }
        if self.refresh_token_ttl_seconds <= self.access_token_ttl_seconds {
            return Err(anyhow!(
                "refresh token ttl must be longer than access token ttl"
            ));
        }
        if self.cert_cache_ttl_seconds < 0 {
            return Err(anyhow!("certificate cache ttl must not be negative"));
        }
        Ok(())
    }
}

/// Store handles used by the pipeline. One backend usually serves all three.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub certificates: Arc<dyn CertificateStore>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + RefreshTokenStore + CertificateStore + 'static,
    {
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            certificates: store,
        }
    }
}

pub struct AuthState {
    config: AuthConfig,
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    csrf: CsrfGuard,
    trust: TrustPolicy,
    certificates: CertificateAuthenticator,
    dummy_password_hash: String,
}

impl AuthState {
    /// Build every component from configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the JWT secret is too short.
    pub fn new(
        config: AuthConfig,
        jwt_secret: &SecretString,
        stores: Stores,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let access = AccessTokenCodec::new(
            jwt_secret,
            config.jwt_issuer.clone(),
            Duration::seconds(config.access_token_ttl_seconds),
        )?;
        let tokens = TokenService::new(
            stores.users.clone(),
            stores.refresh_tokens,
            access,
            clock.clone(),
            Duration::seconds(config.refresh_token_ttl_seconds),
        );
        let csrf = CsrfGuard::new(config.csrf_cookie_name.clone(), config.cookie_secure);
        let trust = TrustPolicy::new(
            config.trust_standard_threshold,
            config.trust_sensitive_threshold,
            config.trust_mode,
        )?;
        let certificates = CertificateAuthenticator::new(
            stores.certificates,
            &config.cert_allowed_issuers,
            Duration::seconds(config.cert_cache_ttl_seconds),
            clock,
        )?;

        let dummy_password_hash =
            hash_password("trustgate-unknown-user").context("hash login timing placeholder")?;

        if trust.mode() == TrustMode::Audit {
            warn!(
                environment = %config.environment,
                "Trust mode is AUDIT: low-trust requests are logged but NOT blocked"
            );
        }

        Ok(Self {
            config,
            users: stores.users,
            tokens,
            csrf,
            trust,
            certificates,
            dummy_password_hash,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    #[must_use]
    pub fn trust(&self) -> &TrustPolicy {
        &self.trust
    }

    #[must_use]
    pub fn certificates(&self) -> &CertificateAuthenticator {
        &self.certificates
    }

    /// Verified against when a login names an unknown user, so both paths cost one Argon2 run.
    #[must_use]
    pub fn dummy_password_hash(&self) -> &str {
        &self.dummy_password_hash
    }
}
