use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicyLevel {
    Public,
    Standard,
    Sensitive,
}

impl PolicyLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Standard => "standard",
            Self::Sensitive => "sensitive",
        }
    }
}

impl fmt::Display for PolicyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforce blocks low-trust requests; audit only logs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TrustMode {
    #[default]
    Enforce,
    Audit,
}

impl TrustMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Audit => "audit",
        }
    }
}

impl FromStr for TrustMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "audit" => Ok(Self::Audit),
            other => Err(format!("unknown trust mode: {other}")),
        }
    }
}

/// Route to policy level mapping. Matching is on the router's matched path.
#[derive(Clone, Debug)]
pub struct PolicyTable {
    public: Vec<&'static str>,
    sensitive: Vec<&'static str>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            public: vec![
                "/health",
                "/login",
                "/refresh",
                "/logout",
                "/csrf-token",
                "/swagger-ui",
                "/api-docs/openapi.json",
            ],
            sensitive: vec!["/password", "/certificates", "/certificates/revoke"],
        }
    }
}

impl PolicyTable {
    #[must_use]
    pub fn resolve(&self, path: &str) -> PolicyLevel {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        if path.starts_with("/swagger-ui/") || self.public.contains(&path) {
            PolicyLevel::Public
        } else if self.sensitive.contains(&path) {
            PolicyLevel::Sensitive
        } else {
            PolicyLevel::Standard
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrustPolicy {
    standard_threshold: u8,
    sensitive_threshold: u8,
    mode: TrustMode,
    table: PolicyTable,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            standard_threshold: 50,
            sensitive_threshold: 75,
            mode: TrustMode::Enforce,
            table: PolicyTable::default(),
        }
    }
}

impl TrustPolicy {
    /// # Errors
    /// Returns an error if a threshold exceeds 100 or `sensitive` is below `standard`.
    pub fn new(standard_threshold: u8, sensitive_threshold: u8, mode: TrustMode) -> Result<Self> {
        if standard_threshold > 100 || sensitive_threshold > 100 {
            return Err(anyhow!("trust thresholds must be within 0..=100"));
        }
        if sensitive_threshold < standard_threshold {
            return Err(anyhow!(
                "sensitive threshold ({sensitive_threshold}) must not be below standard threshold ({standard_threshold})"
            ));
        }
        Ok(Self {
            standard_threshold,
            sensitive_threshold,
            mode,
            table: PolicyTable::default(),
        })
    }

    #[must_use]
    pub fn mode(&self) -> TrustMode {
        self.mode
    }

    #[must_use]
    pub fn level_for(&self, path: &str) -> PolicyLevel {
        self.table.resolve(path)
    }

    #[must_use]
    pub fn threshold(&self, level: PolicyLevel) -> u8 {
        match level {
            PolicyLevel::Public => 0,
            PolicyLevel::Standard => self.standard_threshold,
            PolicyLevel::Sensitive => self.sensitive_threshold,
        }
    }
}
