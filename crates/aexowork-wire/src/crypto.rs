//! Hashing, ECDSA signing, and message-id minting.
//!
//! Signing is ECDSA over secp256k1 with a SHA-256 digest; signatures travel
//! as 64-byte fixed encodings in lowercase hex, public keys as compressed
//! SEC1 points. Verification ships in two implementations: the permissive
//! placeholder the protocol currently runs with, and a strict one selected
//! by the `strict-verify` feature.

use std::sync::Arc;

use k256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::WireError;

/// Lowercase-hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Mint a fabric message id: 16 random bytes, lowercase hex (32 chars).
pub fn mint_message_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Signer ────────────────────────────────────────────────────────────────────

/// An agent's ECDSA signing key. The private scalar never leaves the
/// process; only hex signatures and the compressed public key are exposed.
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Parse a private key from hex.
    ///
    /// Accepts a bare 32-byte scalar (64 hex chars), with or without a `0x`
    /// prefix. DER-wrapped keys are accepted by taking the trailing 64 hex
    /// chars, which is where the scalar sits in the common encodings.
    pub fn from_hex(hex_key: &str) -> Result<Self, WireError> {
        let trimmed = hex_key.trim().trim_start_matches("0x");
        if trimmed.len() < 64 {
            return Err(WireError::InvalidKey(format!(
                "private key too short: {} hex chars",
                trimmed.len()
            )));
        }
        let scalar = &trimmed[trimmed.len() - 64..];
        let bytes = hex::decode(scalar).map_err(|e| WireError::InvalidKey(e.to_string()))?;
        let key =
            SigningKey::from_slice(&bytes).map_err(|e| WireError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Generate a fresh random key (tests and local provisioning).
    pub fn random() -> Self {
        Self {
            key: SigningKey::random(&mut k256::elliptic_curve::rand_core::OsRng),
        }
    }

    /// Hex of the raw 32-byte private scalar.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// Compressed SEC1 public key, lowercase hex (66 chars).
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_encoded_point(true).as_bytes())
    }

    /// Sign `message` (SHA-256 digest, RFC 6979 nonce) and return the
    /// 64-byte fixed signature as hex.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let signature: Signature = self.key.sign(message);
        hex::encode(signature.to_bytes())
    }

    /// The anchor signature: over the UTF-8 bytes of the hex hash followed
    /// by the decimal millisecond timestamp.
    pub fn anchor_signature(&self, hash_hex: &str, timestamp_ms: i64) -> String {
        self.sign_hex(format!("{hash_hex}{timestamp_ms}").as_bytes())
    }
}

// ── Verification ──────────────────────────────────────────────────────────────

/// Seam for signature checking on received messages.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool;
    fn name(&self) -> &'static str;
}

/// Accepts every signature. This is the documented current behavior of the
/// protocol; enforcement is opt-in via [`StrictVerifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveVerifier;

impl SignatureVerifier for PermissiveVerifier {
    fn verify(&self, _message: &[u8], _signature_hex: &str, _public_key_hex: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "permissive"
    }
}

/// Real ECDSA verification against a compressed SEC1 public key.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictVerifier;

impl SignatureVerifier for StrictVerifier {
    fn verify(&self, message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
        let Ok(key_bytes) = hex::decode(public_key_hex.trim_start_matches("0x")) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_sec1_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&sig_bytes) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }

    fn name(&self) -> &'static str {
        "strict"
    }
}

/// The verifier the fabric runs with: strict when the `strict-verify`
/// feature is enabled, permissive otherwise.
pub fn default_verifier() -> Arc<dyn SignatureVerifier> {
    #[cfg(feature = "strict-verify")]
    {
        Arc::new(StrictVerifier)
    }
    #[cfg(not(feature = "strict-verify"))]
    {
        Arc::new(PermissiveVerifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_is_32_lowercase_hex_chars() {
        let id = mint_message_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, mint_message_id(), "ids must not collide trivially");
    }

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sign_then_strict_verify_round_trip() {
        let signer = Signer::random();
        let sig = signer.sign_hex(b"payload");
        assert!(StrictVerifier.verify(b"payload", &sig, &signer.public_key_hex()));
        assert!(!StrictVerifier.verify(b"tampered", &sig, &signer.public_key_hex()));
    }

    #[test]
    fn strict_verifier_rejects_wrong_key() {
        let signer = Signer::random();
        let other = Signer::random();
        let sig = signer.sign_hex(b"payload");
        assert!(!StrictVerifier.verify(b"payload", &sig, &other.public_key_hex()));
    }

    #[test]
    fn strict_verifier_rejects_garbage_encodings() {
        assert!(!StrictVerifier.verify(b"m", "zz", "zz"));
        assert!(!StrictVerifier.verify(b"m", "00", &Signer::random().public_key_hex()));
    }

    #[test]
    fn permissive_verifier_accepts_anything() {
        assert!(PermissiveVerifier.verify(b"m", "not-a-signature", "not-a-key"));
    }

    #[test]
    fn key_round_trips_through_hex() {
        let signer = Signer::random();
        let restored = Signer::from_hex(&signer.private_key_hex()).unwrap();
        assert_eq!(restored.public_key_hex(), signer.public_key_hex());
        let prefixed = format!("0x{}", signer.private_key_hex());
        assert_eq!(
            Signer::from_hex(&prefixed).unwrap().public_key_hex(),
            signer.public_key_hex()
        );
    }

    #[test]
    fn der_wrapped_key_uses_trailing_scalar() {
        let signer = Signer::random();
        let wrapped = format!("3030020100aabbccdd{}", signer.private_key_hex());
        assert_eq!(
            Signer::from_hex(&wrapped).unwrap().public_key_hex(),
            signer.public_key_hex()
        );
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(matches!(
            Signer::from_hex("abcd"),
            Err(WireError::InvalidKey(_))
        ));
    }

    #[test]
    fn anchor_signature_covers_hash_and_timestamp() {
        let signer = Signer::random();
        let hash = sha256_hex(b"payload");
        let sig = signer.anchor_signature(&hash, 1000);
        let expected_message = format!("{hash}1000");
        assert!(StrictVerifier.verify(
            expected_message.as_bytes(),
            &sig,
            &signer.public_key_hex()
        ));
    }
}
