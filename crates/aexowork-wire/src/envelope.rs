//! The message envelope exchanged between agents, and its canonical byte form.
//!
//! Everything that hashes or signs an envelope goes through [`canonical_json`]:
//! compact JSON with keys sorted lexicographically at every nesting level
//! (JCS-style). Two independent encodings of the same envelope are
//! byte-identical, which is what makes the anchor hash reproducible on the
//! receiving side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{crypto::Signer, error::WireError};

/// A routable message between agents.
///
/// Application fields beyond the fabric's own are preserved verbatim in
/// `extra` and re-serialized bit-identically, so intermediate hops never
/// corrupt the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Dotted subject name, e.g. `aexowork.offers`. Never empty for
    /// routable messages.
    pub subject: String,

    /// Sender identity; attached by the send pipeline.
    #[serde(rename = "fromAccountId", skip_serializing_if = "Option::is_none")]
    pub from_account_id: Option<String>,

    /// Recipient account id. Absent means the message is a broadcast
    /// candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Application message type tag, e.g. `Offer` or `JobPost`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,

    /// Sender wall-clock milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// ECDSA signature over the canonical envelope bytes (without this
    /// field). Required for authenticated message types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Application fields the fabric does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Envelope {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            from_account_id: None,
            to: None,
            message_type: None,
            timestamp: None,
            signature: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The recipient account id, with an empty or whitespace-only `to`
    /// treated as absent.
    pub fn recipient(&self) -> Option<&str> {
        self.to.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Canonical compact JSON of the whole envelope.
    pub fn to_canonical_json(&self) -> Result<String, WireError> {
        canonical_json(&serde_json::to_value(self)?)
    }
}

/// Serialize a JSON value compactly with object keys in lexicographic order
/// at every nesting level.
///
/// `serde_json`'s default map is already sorted, but this function does not
/// depend on that: a dependency elsewhere in the tree enabling the
/// `preserve_order` feature must not silently change the wire format.
pub fn canonical_json(value: &Value) -> Result<String, WireError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), WireError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// The bytes an envelope signature covers: the canonical JSON of the
/// envelope with the `signature` field removed.
pub fn envelope_signing_bytes(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    let mut unsigned = envelope.clone();
    unsigned.signature = None;
    Ok(unsigned.to_canonical_json()?.into_bytes())
}

/// Sign an envelope in place with the sender's key.
pub fn sign_envelope(envelope: &mut Envelope, signer: &Signer) -> Result<(), WireError> {
    let bytes = envelope_signing_bytes(envelope)?;
    envelope.signature = Some(signer.sign_hex(&bytes));
    Ok(())
}
