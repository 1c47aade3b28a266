use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";

/// HS256 keys shorter than the digest size are rejected.
const MIN_JWT_SECRET_BYTES: usize = 32;

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
}

impl Options {
    /// Parse token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or too short.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };
        if secret.len() < MIN_JWT_SECRET_BYTES {
            anyhow::bail!("--{ARG_JWT_SECRET} must be at least {MIN_JWT_SECRET_BYTES} bytes");
        }

        Ok(Self {
            jwt_secret: SecretString::from(secret),
            jwt_issuer: matches
                .get_one::<String>(ARG_JWT_ISSUER)
                .cloned()
                .unwrap_or_else(|| "trustgate".to_string()),
            access_token_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(900),
            refresh_token_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(604_800),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HS256 signing secret for access tokens (at least 32 bytes)")
                .env("TRUSTGATE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Issuer (iss) claim of access tokens")
                .env("TRUSTGATE_JWT_ISSUER")
                .default_value("trustgate"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("TRUSTGATE_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token TTL in seconds")
                .env("TRUSTGATE_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn command() -> Command {
        with_args(Command::new("test"))
    }

    #[test]
    fn parses_defaults() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("TRUSTGATE_JWT_SECRET", Some(SECRET)),
                ("TRUSTGATE_JWT_ISSUER", None),
                ("TRUSTGATE_ACCESS_TOKEN_TTL_SECONDS", None),
                ("TRUSTGATE_REFRESH_TOKEN_TTL_SECONDS", None),
            ],
            || {
                let matches = command().get_matches_from(vec!["test"]);
                let options = Options::parse(&matches)?;
                assert_eq!(options.jwt_secret.expose_secret(), SECRET);
                assert_eq!(options.jwt_issuer, "trustgate");
                assert_eq!(options.access_token_ttl_seconds, 900);
                assert_eq!(options.refresh_token_ttl_seconds, 604_800);
                Ok(())
            },
        )
    }

    #[test]
    fn short_secret_rejected() {
        temp_env::with_vars([("TRUSTGATE_JWT_SECRET", Some("too-short"))], || {
            let matches = command().get_matches_from(vec!["test"]);
            let result = Options::parse(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("at least 32 bytes"));
            }
        });
    }

    #[test]
    fn ttl_must_be_positive() {
        let result = command().try_get_matches_from(vec![
            "test",
            "--jwt-secret",
            SECRET,
            "--access-token-ttl-seconds",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn secret_is_not_printed() -> anyhow::Result<()> {
        let matches = command().get_matches_from(vec!["test", "--jwt-secret", SECRET]);
        let options = Options::parse(&matches)?;
        assert!(!format!("{options:?}").contains(SECRET));
        Ok(())
    }
}
