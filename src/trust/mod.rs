//! Per-request trust scoring and enforcement.

mod policy;
mod score;

pub use policy::{PolicyLevel, PolicyTable, TrustMode, TrustPolicy};
pub use score::{TrustContext, TrustFactor, TrustSignals, compute_trust_score};

/// Outcome of comparing a score with the route threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustDecision {
    Allow,
    /// Below threshold, but audit mode lets it through.
    AllowAudited,
    Deny,
}

impl TrustPolicy {
    #[must_use]
    pub fn decide(&self, context: &TrustContext) -> TrustDecision {
        if context.policy_level == PolicyLevel::Public
            || context.score >= self.threshold(context.policy_level)
        {
            return TrustDecision::Allow;
        }
        match self.mode() {
            TrustMode::Enforce => TrustDecision::Deny,
            TrustMode::Audit => TrustDecision::AllowAudited,
        }
    }
}
