pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod records;
pub mod subjects;

pub use codec::{Base64Codec, PayloadCodec};
pub use crypto::{
    default_verifier, mint_message_id, sha256_hex, PermissiveVerifier, SignatureVerifier, Signer,
    StrictVerifier,
};
pub use envelope::{canonical_json, envelope_signing_bytes, sign_envelope, Envelope};
pub use error::WireError;
pub use records::{AnchorRecord, OffBusMessage, ANCHOR_TYPE, PROTOCOL_VERSION};
