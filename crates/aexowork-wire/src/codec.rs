//! Payload obfuscation codec.
//!
//! The anchor hash is always computed over codec *output*, so swapping the
//! codec changes what travels on the bus but not the verification law. The
//! default is base64 — a placeholder until an AEAD codec (AES-GCM over a
//! negotiated session key) replaces it at this single seam.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::WireError;

/// The single swap point between plaintext envelope bytes and what is
/// carried in `OffBusMessage::encrypted_payload`.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, plaintext: &[u8]) -> String;
    fn decode(&self, encoded: &str) -> Result<Vec<u8>, WireError>;
    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}

/// Standard-alphabet base64 with padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl PayloadCodec for Base64Codec {
    fn encode(&self, plaintext: &[u8]) -> String {
        STANDARD.encode(plaintext)
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>, WireError> {
        STANDARD
            .decode(encoded)
            .map_err(|e| WireError::Decode(format!("base64: {e}")))
    }

    fn name(&self) -> &'static str {
        "base64"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_arbitrary_bytes() {
        let codec = Base64Codec;
        for payload in [
            b"".to_vec(),
            b"hello".to_vec(),
            (0u8..=255).collect::<Vec<u8>>(),
        ] {
            let encoded = codec.encode(&payload);
            assert_eq!(codec.decode(&encoded).unwrap(), payload);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = Base64Codec;
        let payload = br#"{"subject":"aexowork.jobs"}"#;
        assert_eq!(codec.encode(payload), codec.encode(payload));
    }

    #[test]
    fn invalid_input_is_a_decode_error() {
        let err = Base64Codec.decode("not base64 !!!").unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }
}
