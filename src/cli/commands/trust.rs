use anyhow::anyhow;
use clap::{Arg, ArgMatches, Command};

use crate::trust::TrustMode;

pub const ARG_TRUST_MODE: &str = "trust-mode";
pub const ARG_TRUST_STANDARD_THRESHOLD: &str = "trust-standard-threshold";
pub const ARG_TRUST_SENSITIVE_THRESHOLD: &str = "trust-sensitive-threshold";

#[derive(Debug, Clone)]
pub struct Options {
    pub mode: TrustMode,
    pub standard_threshold: u8,
    pub sensitive_threshold: u8,
}

impl Options {
    /// Parse trust policy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the mode is unknown or the thresholds are inverted.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let mode = matches
            .get_one::<String>(ARG_TRUST_MODE)
            .map(|value| value.parse::<TrustMode>())
            .transpose()
            .map_err(|err| anyhow!(err))?
            .unwrap_or_default();
        let standard_threshold = matches
            .get_one::<u8>(ARG_TRUST_STANDARD_THRESHOLD)
            .copied()
            .unwrap_or(50);
        let sensitive_threshold = matches
            .get_one::<u8>(ARG_TRUST_SENSITIVE_THRESHOLD)
            .copied()
            .unwrap_or(75);

        if sensitive_threshold < standard_threshold {
            anyhow::bail!(
                "--{ARG_TRUST_SENSITIVE_THRESHOLD} ({sensitive_threshold}) must not be lower than --{ARG_TRUST_STANDARD_THRESHOLD} ({standard_threshold})"
            );
        }

        Ok(Self {
            mode,
            standard_threshold,
            sensitive_threshold,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TRUST_MODE)
                .long(ARG_TRUST_MODE)
                .help("enforce denies low-trust requests, audit only logs them")
                .env("TRUSTGATE_TRUST_MODE")
                .default_value("enforce")
                .value_parser(["enforce", "audit"]),
        )
        .arg(
            Arg::new(ARG_TRUST_STANDARD_THRESHOLD)
                .long(ARG_TRUST_STANDARD_THRESHOLD)
                .help("Minimum trust score for standard routes")
                .env("TRUSTGATE_TRUST_STANDARD_THRESHOLD")
                .default_value("50")
                .value_parser(clap::value_parser!(u8).range(0..=100)),
        )
        .arg(
            Arg::new(ARG_TRUST_SENSITIVE_THRESHOLD)
                .long(ARG_TRUST_SENSITIVE_THRESHOLD)
                .help("Minimum trust score for sensitive routes")
                .env("TRUSTGATE_TRUST_SENSITIVE_THRESHOLD")
                .default_value("75")
                .value_parser(clap::value_parser!(u8).range(0..=100)),
        )
}
