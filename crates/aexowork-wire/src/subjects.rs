//! Subject vocabulary and bus subject helpers.
//!
//! Subjects are dotted names owned by the applications on top of the
//! fabric; this module only collects the marketplace's well-known set so
//! agents don't scatter string literals.

/// Wildcard registry key: handlers under this subject see every dispatch.
pub const WILDCARD: &str = "*";

pub const JOBS: &str = "aexowork.jobs";
pub const OFFERS: &str = "aexowork.offers";
pub const OFFERS_ACCEPTED: &str = "aexowork.offers.accepted";
pub const DELIVERIES: &str = "aexowork.deliveries";
pub const VERIFICATION_REQUESTS: &str = "aexowork.verification.requests";
pub const VERIFICATIONS: &str = "aexowork.verifications";
pub const ESCROW_CREATED: &str = "aexowork.escrow.created";
pub const ESCROW_RELEASED: &str = "aexowork.escrow.released";
pub const ESCROW_AUTO_RELEASED: &str = "aexowork.escrow.auto_released";
pub const REPUTATION_UPDATES: &str = "aexowork.reputation.updates";
pub const DISPUTES: &str = "aexowork.disputes";
pub const EVIDENCE: &str = "aexowork.evidence";
pub const AGENT_REGISTERED: &str = "aexowork.agent.registered";
pub const AGENT_DEPLOYED: &str = "aexowork.agent.deployed";
pub const AGENT_DISCOVERY: &str = "aexowork.agent.discovery";

/// The bus subject carrying off-bus payloads for one recipient.
pub fn offchain_subject(account_id: &str) -> String {
    format!("offchain.{account_id}")
}
