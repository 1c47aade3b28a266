//! Deterministic trust scoring.
//!
//! Every signal maps to a fixed weight; the score is the clamped sum. Penalties for an
//! authenticated principal never take the score below [`AUTHENTICATED`], so anomalies can
//! cost continuity bonuses and the sensitive tier but never the standard one. Scoring
//! never touches the store, so it can run on every request.

use serde::Serialize;
use std::net::IpAddr;

use super::policy::PolicyLevel;

pub const UNAUTHENTICATED_BASELINE: i16 = 10;
pub const AUTHENTICATED: i16 = 50;
pub const STRONG_AUTH_CERTIFICATE: i16 = 25;
pub const DEVICE_CONTINUITY: i16 = 10;
pub const NETWORK_CONTINUITY: i16 = 10;
pub const USER_AGENT_ANOMALY: i16 = -15;
pub const NETWORK_JUMP: i16 = -20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrustFactor {
    pub name: &'static str,
    pub weight: i16,
}

/// Score plus the factors that produced it, attached to the request for downstream audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrustContext {
    pub score: u8,
    pub factors: Vec<TrustFactor>,
    pub policy_level: PolicyLevel,
}

impl TrustContext {
    #[must_use]
    pub fn factor_names(&self) -> Vec<&'static str> {
        self.factors.iter().map(|factor| factor.name).collect()
    }
}

/// Inputs observed on one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustSignals {
    pub authenticated: bool,
    pub strong_auth: bool,
    /// Address and UA fingerprint recorded in the access token at issuance.
    pub token_ip: Option<String>,
    pub token_fingerprint: Option<String>,
    /// Address and UA fingerprint of the current request.
    pub request_ip: Option<String>,
    pub request_fingerprint: Option<String>,
}

#[must_use]
pub fn compute_trust_score(signals: &TrustSignals, policy_level: PolicyLevel) -> TrustContext {
    let mut factors = Vec::new();
    let mut push = |name, weight| factors.push(TrustFactor { name, weight });

    if signals.authenticated {
        push("authenticated", AUTHENTICATED);
    } else {
        push("unauthenticated_baseline", UNAUTHENTICATED_BASELINE);
    }

    if signals.strong_auth {
        push("strong_auth_certificate", STRONG_AUTH_CERTIFICATE);
    }

    if signals.authenticated {
        // Clients that send no User-Agent carry no device signal either way.
        if let (Some(current), Some(issued)) =
            (&signals.request_fingerprint, &signals.token_fingerprint)
        {
            if current == issued {
                push("device_continuity", DEVICE_CONTINUITY);
            } else {
                push("user_agent_anomaly", USER_AGENT_ANOMALY);
            }
        }

        if let (Some(current), Some(issued)) = (&signals.request_ip, &signals.token_ip) {
            match network_relation(current, issued) {
                NetworkRelation::Same => push("network_continuity", NETWORK_CONTINUITY),
                NetworkRelation::Jump => push("network_jump", NETWORK_JUMP),
                NetworkRelation::Nearby => {}
            }
        }
    }

    let mut total: i16 = factors.iter().map(|factor| factor.weight).sum();
    if signals.authenticated {
        total = total.max(AUTHENTICATED);
    }
    let score = u8::try_from(total.clamp(0, 100)).unwrap_or(0);
    TrustContext {
        score,
        factors,
        policy_level,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum NetworkRelation {
    Same,
    Nearby,
    Jump,
}

/// IPv4 addresses within one /16 and IPv6 within one /48 count as the same network.
fn network_relation(current: &str, issued: &str) -> NetworkRelation {
    if current == issued {
        return NetworkRelation::Same;
    }
    match (current.parse::<IpAddr>(), issued.parse::<IpAddr>()) {
        (Ok(IpAddr::V4(a)), Ok(IpAddr::V4(b))) => {
            if a == b {
                NetworkRelation::Same
            } else if a.octets()[..2] == b.octets()[..2] {
                NetworkRelation::Nearby
            } else {
                NetworkRelation::Jump
            }
        }
        (Ok(IpAddr::V6(a)), Ok(IpAddr::V6(b))) => {
            if a == b {
                NetworkRelation::Same
            } else if a.segments()[..3] == b.segments()[..3] {
                NetworkRelation::Nearby
            } else {
                NetworkRelation::Jump
            }
        }
        _ => NetworkRelation::Jump,
    }
}
