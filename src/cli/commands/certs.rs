use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_CERT_ALLOWED_ISSUER: &str = "cert-allowed-issuer";
pub const ARG_CERT_CACHE_TTL_SECONDS: &str = "cert-cache-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub allowed_issuers: Vec<String>,
    pub cache_ttl_seconds: i64,
}

impl Options {
    /// Parse certificate arguments from matches.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let allowed_issuers = matches
            .get_many::<String>(ARG_CERT_ALLOWED_ISSUER)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            allowed_issuers,
            cache_ttl_seconds: matches
                .get_one::<i64>(ARG_CERT_CACHE_TTL_SECONDS)
                .copied()
                .unwrap_or(5),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CERT_ALLOWED_ISSUER)
                .long(ARG_CERT_ALLOWED_ISSUER)
                .help("Issuer DN accepted for client certificates; repeat for several")
                .long_help(
                    "Issuer distinguished name accepted for client certificates.\n\nRepeat the flag for several issuers. In the environment variable, separate DNs with ';'.\nWith no issuers configured every presented certificate is rejected.",
                )
                .env("TRUSTGATE_CERT_ALLOWED_ISSUERS")
                .action(ArgAction::Append)
                .value_delimiter(';'),
        )
        .arg(
            Arg::new(ARG_CERT_CACHE_TTL_SECONDS)
                .long(ARG_CERT_CACHE_TTL_SECONDS)
                .help("Certificate lookup cache TTL in seconds (0 disables caching)")
                .env("TRUSTGATE_CERT_CACHE_TTL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
}
