//! On-ledger and off-bus protocol records.
//!
//! Field names and ordering are wire-protocol: the anchor JSON that lands on
//! a ledger topic is `{"type":"message_anchor","messageId":…,"hash":…,
//! "timestamp":…,"signature":…,"fromAccountId":…,"toAccountId":…,
//! "version":"1.0"}`. Struct declaration order below matches that layout.

use serde::{Deserialize, Serialize};

/// Discriminator value of an anchor record's `type` field.
pub const ANCHOR_TYPE: &str = "message_anchor";

/// Fabric protocol version tag carried in every anchor.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Small on-ledger proof that a specific payload existed at a specific time,
/// posted to the recipient's inbound topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    /// 16 random bytes, lowercase hex (32 chars). Shared with the off-bus
    /// copy for correlation.
    pub message_id: String,
    /// SHA-256 of the codec-encoded payload, lowercase hex (64 chars).
    pub hash: String,
    /// Sender wall-clock milliseconds at send time.
    pub timestamp: i64,
    /// ECDSA signature over `hash || timestamp`.
    pub signature: String,
    pub from_account_id: String,
    /// `null` on the wire when the anchor belongs to a broadcast copy whose
    /// recipient is implicit in the topic it was posted to.
    pub to_account_id: Option<String>,
    pub version: String,
}

impl AnchorRecord {
    pub fn new(
        message_id: impl Into<String>,
        hash: impl Into<String>,
        timestamp: i64,
        signature: impl Into<String>,
        from_account_id: impl Into<String>,
        to_account_id: Option<String>,
    ) -> Self {
        Self {
            record_type: ANCHOR_TYPE.to_string(),
            message_id: message_id.into(),
            hash: hash.into(),
            timestamp,
            signature: signature.into(),
            from_account_id: from_account_id.into(),
            to_account_id,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Whether a parsed JSON object is an anchor record.
    pub fn is_anchor(value: &serde_json::Value) -> bool {
        value.get("type").and_then(|t| t.as_str()) == Some(ANCHOR_TYPE)
    }
}

/// The ephemeral payload carrier published on `offchain.<recipient>`.
///
/// Carries the same `message_id`, `hash`, `timestamp`, and `signature` as
/// the matching anchor; the recipient correlates the two before dispatching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffBusMessage {
    pub message_id: String,
    /// Codec output (base64 by default) of the canonical envelope JSON.
    pub encrypted_payload: String,
    pub hash: String,
    pub timestamp: i64,
    pub signature: String,
    pub from_account_id: String,
}
