//! Cryptographic Facade
//!
//! Thin, deterministic wrappers around the Curve25519 primitives the
//! transaction engine consumes:
//!
//! - SHA-256 digests
//! - secret-phrase keypairs (Ed25519: 32-byte public keys, 64-byte
//!   deterministic signatures)
//! - account-id derivation: the leading 8 bytes, little-endian, of the
//!   SHA-256 digest of an account's public key
//!
//! The signing seed is the SHA-256 digest of the secret phrase, so the same
//! phrase always yields the same keypair on every node. Message encryption
//! lives in [`encrypted_data`].

pub mod encrypted_data;

pub use encrypted_data::EncryptedData;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// A 32-byte Curve25519 public key.
pub type PublicKey = [u8; 32];

/// A 64-byte transaction signature.
pub type SignatureBytes = [u8; 64];

/// SHA-256 digest of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 digest over the concatenation of two byte strings, without an
/// intermediate allocation.
pub fn sha256_pair(first: &[u8], second: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(first);
    hasher.update(second);
    hasher.finalize().into()
}

fn signing_key(secret_phrase: &str) -> SigningKey {
    let seed = Zeroizing::new(sha256(secret_phrase.as_bytes()));
    SigningKey::from_bytes(&seed)
}

/// Derives the public key for a secret phrase.
pub fn public_key(secret_phrase: &str) -> PublicKey {
    signing_key(secret_phrase).verifying_key().to_bytes()
}

/// Signs a message with the keypair derived from the secret phrase.
/// Deterministic: the same `(message, secret_phrase)` pair always yields
/// the same 64 bytes.
pub fn sign(message: &[u8], secret_phrase: &str) -> SignatureBytes {
    signing_key(secret_phrase).sign(message).to_bytes()
}

/// Verifies a signature over a message against a public key. Malformed
/// keys simply fail verification.
pub fn verify(signature: &SignatureBytes, message: &[u8], public_key: &PublicKey) -> bool {
    match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key
            .verify(message, &Signature::from_bytes(signature))
            .is_ok(),
        Err(_) => false,
    }
}

/// Derives the numeric account id bound to a public key: the first 8 bytes
/// of `SHA256(public_key)`, interpreted little-endian.
pub fn account_id(public_key: &PublicKey) -> u64 {
    let hash = sha256(public_key);
    u64::from_le_bytes(hash[..8].try_into().expect("slice is 8 bytes"))
}

/// Derives the account id for a secret phrase.
pub fn account_id_for_phrase(secret_phrase: &str) -> u64 {
    account_id(&public_key(secret_phrase))
}

/// Formats an account or transaction id the way the wire and API expect:
/// as an unsigned decimal string.
pub fn unsigned_decimal(id: u64) -> String {
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str = "orchard vault ember quince";

    #[test]
    fn test_public_key_is_deterministic() {
        assert_eq!(public_key(PHRASE), public_key(PHRASE));
        assert_ne!(public_key(PHRASE), public_key("other phrase"));
    }

    #[test]
    fn test_sign_and_verify() {
        let message = b"canonical transaction bytes";
        let pk = public_key(PHRASE);
        let sig = sign(message, PHRASE);

        assert!(verify(&sig, message, &pk));
        assert!(!verify(&sig, b"tampered bytes", &pk));
        assert!(!verify(&sig, message, &public_key("other phrase")));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let message = b"same input, same signature";
        assert_eq!(sign(message, PHRASE), sign(message, PHRASE));
    }

    #[test]
    fn test_account_id_uses_leading_hash_bytes() {
        let pk = public_key(PHRASE);
        let hash = sha256(&pk);
        let expected = u64::from_le_bytes(hash[..8].try_into().unwrap());
        assert_eq!(account_id(&pk), expected);
        assert_eq!(account_id_for_phrase(PHRASE), expected);
    }

    #[test]
    fn test_verify_rejects_malformed_key() {
        let sig = sign(b"msg", PHRASE);
        // Not a valid curve point.
        let bogus = [0xFF_u8; 32];
        assert!(!verify(&sig, b"msg", &bogus));
    }

    #[test]
    fn test_sha256_pair_matches_concatenation() {
        let joined = [b"abc".as_slice(), b"def".as_slice()].concat();
        assert_eq!(sha256_pair(b"abc", b"def"), sha256(&joined));
    }
}
