//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an action carrying the full server
//! configuration.

use crate::api::Environment;
use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{self, certs, csrf, tokens, trust};
use crate::trust::TrustMode;
use anyhow::{Context, Result, anyhow};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let frontend_base_url = matches
        .get_one::<String>(commands::ARG_FRONTEND_BASE_URL)
        .cloned()
        .context("missing required argument: --frontend-base-url")?;
    let environment = matches
        .get_one::<String>(commands::ARG_ENVIRONMENT)
        .map(|value| value.parse::<Environment>())
        .transpose()
        .map_err(|err| anyhow!(err))?
        .unwrap_or_default();

    let token_opts = tokens::Options::parse(matches)?;
    let csrf_opts = csrf::Options::parse(matches)?;
    let trust_opts = trust::Options::parse(matches)?;
    let cert_opts = certs::Options::parse(matches);

    if environment == Environment::Production && trust_opts.mode == TrustMode::Audit {
        anyhow::bail!("--trust-mode audit is not allowed in production");
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url,
        environment,
        jwt_secret: token_opts.jwt_secret,
        jwt_issuer: token_opts.jwt_issuer,
        access_token_ttl_seconds: token_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: token_opts.refresh_token_ttl_seconds,
        csrf_cookie_name: csrf_opts.cookie_name,
        cookie_secure: csrf_opts.cookie_secure,
        trust_mode: trust_opts.mode,
        trust_standard_threshold: trust_opts.standard_threshold,
        trust_sensitive_threshold: trust_opts.sensitive_threshold,
        cert_allowed_issuers: cert_opts.allowed_issuers,
        cert_cache_ttl_seconds: cert_opts.cache_ttl_seconds,
    }))
}
