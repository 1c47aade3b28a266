use clap::{Arg, ArgMatches, Command};

use crate::csrf::DEFAULT_CSRF_COOKIE_NAME;

pub const ARG_CSRF_COOKIE_NAME: &str = "csrf-cookie-name";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug, Clone)]
pub struct Options {
    pub cookie_name: String,
    pub cookie_secure: bool,
}

impl Options {
    /// Parse CSRF cookie arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the cookie name is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let cookie_name = matches
            .get_one::<String>(ARG_CSRF_COOKIE_NAME)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CSRF_COOKIE_NAME.to_string());
        if cookie_name.trim().is_empty() {
            anyhow::bail!("--{ARG_CSRF_COOKIE_NAME} must not be empty");
        }

        Ok(Self {
            cookie_name,
            cookie_secure: matches
                .get_one::<bool>(ARG_COOKIE_SECURE)
                .copied()
                .unwrap_or(true),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CSRF_COOKIE_NAME)
                .long(ARG_CSRF_COOKIE_NAME)
                .help("Name of the double-submit CSRF cookie")
                .env("TRUSTGATE_CSRF_COOKIE_NAME")
                .default_value(DEFAULT_CSRF_COOKIE_NAME),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the CSRF cookie Secure (disable only for plain-HTTP development)")
                .env("TRUSTGATE_COOKIE_SECURE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}
