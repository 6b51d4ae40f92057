//! Authenticated Message Encryption
//!
//! [`EncryptedData`] carries the ciphertext and nonce of an encrypted
//! appendage payload. The symmetric key is derived by X25519 Diffie-Hellman
//! between the sender's signing key and the recipient's public key (both
//! converted from their Edwards form), hashed with SHA-256, and used with
//! XChaCha20-Poly1305. Either party can reconstruct the key, so the sender
//! can also decrypt messages it originated (the encrypt-to-self appendage
//! relies on this with sender == recipient).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::PublicKey;
use crate::error::{not_valid, Result};

/// Length of the XChaCha20-Poly1305 nonce carried on the wire.
pub const NONCE_LENGTH: usize = 24;

/// An encrypted payload: AEAD ciphertext (plaintext length + 16-byte tag)
/// plus the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    data: Vec<u8>,
    nonce: [u8; NONCE_LENGTH],
}

impl EncryptedData {
    /// Reassembles encrypted data from its wire parts.
    pub fn new(data: Vec<u8>, nonce: [u8; NONCE_LENGTH]) -> Self {
        Self { data, nonce }
    }

    /// Encrypts `plaintext` from the holder of `secret_phrase` to
    /// `their_public_key` with a fresh random nonce.
    pub fn encrypt(
        plaintext: &[u8],
        secret_phrase: &str,
        their_public_key: &PublicKey,
    ) -> Result<Self> {
        let key = shared_key(secret_phrase, their_public_key)?;
        let cipher = XChaCha20Poly1305::new(key.as_slice().into());

        let mut nonce = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce);

        let data = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| not_valid("encryption failed"))?;
        Ok(Self { data, nonce })
    }

    /// Decrypts the payload as the holder of `secret_phrase`, where
    /// `their_public_key` is the other party of the exchange.
    pub fn decrypt(&self, secret_phrase: &str, their_public_key: &PublicKey) -> Result<Vec<u8>> {
        let key = shared_key(secret_phrase, their_public_key)?;
        let cipher = XChaCha20Poly1305::new(key.as_slice().into());
        cipher
            .decrypt(XNonce::from_slice(&self.nonce), self.data.as_slice())
            .map_err(|_| not_valid("decryption failed: wrong key or corrupted data"))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn nonce(&self) -> &[u8; NONCE_LENGTH] {
        &self.nonce
    }

    /// Wire size: ciphertext plus nonce. The length prefix is written by
    /// the owning appendage.
    pub fn size(&self) -> usize {
        self.data.len() + NONCE_LENGTH
    }
}

/// X25519 shared key between our signing scalar and their Edwards public
/// key, hashed to 32 bytes.
fn shared_key(secret_phrase: &str, their_public_key: &PublicKey) -> Result<Zeroizing<[u8; 32]>> {
    let seed = Zeroizing::new(crate::crypto::sha256(secret_phrase.as_bytes()));
    let scalar = Zeroizing::new(SigningKey::from_bytes(&seed).to_scalar_bytes());

    let their_key = VerifyingKey::from_bytes(their_public_key)
        .map_err(|_| not_valid("invalid public key for encryption"))?;
    let their_montgomery = their_key.to_montgomery().to_bytes();

    let shared = Zeroizing::new(x25519_dalek::x25519(*scalar, their_montgomery));

    let mut hasher = Sha256::new();
    hasher.update(shared.as_slice());
    Ok(Zeroizing::new(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::public_key;

    const ALICE: &str = "alice walks the orchard rows";
    const BOB: &str = "bob counts the vault embers";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let bob_pk = public_key(BOB);
        let sealed = EncryptedData::encrypt(b"meet at height 1000", ALICE, &bob_pk).unwrap();

        // Recipient decrypts with the sender's public key.
        let alice_pk = public_key(ALICE);
        let opened = sealed.decrypt(BOB, &alice_pk).unwrap();
        assert_eq!(opened, b"meet at height 1000");
    }

    #[test]
    fn test_sender_can_decrypt_own_message() {
        let bob_pk = public_key(BOB);
        let sealed = EncryptedData::encrypt(b"note to counterparty", ALICE, &bob_pk).unwrap();
        assert_eq!(
            sealed.decrypt(ALICE, &bob_pk).unwrap(),
            b"note to counterparty"
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let bob_pk = public_key(BOB);
        let sealed = EncryptedData::encrypt(b"secret", ALICE, &bob_pk).unwrap();

        let alice_pk = public_key(ALICE);
        assert!(sealed.decrypt("mallory guesses wrong", &alice_pk).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let bob_pk = public_key(BOB);
        let sealed = EncryptedData::encrypt(b"secret", ALICE, &bob_pk).unwrap();

        let mut data = sealed.data().to_vec();
        data[0] ^= 0x01;
        let tampered = EncryptedData::new(data, *sealed.nonce());

        let alice_pk = public_key(ALICE);
        assert!(tampered.decrypt(BOB, &alice_pk).is_err());
    }

    #[test]
    fn test_ciphertext_carries_tag_overhead() {
        let bob_pk = public_key(BOB);
        let sealed = EncryptedData::encrypt(b"12345", ALICE, &bob_pk).unwrap();
        assert_eq!(sealed.data().len(), 5 + 16);
        assert_eq!(sealed.size(), 5 + 16 + NONCE_LENGTH);
    }
}
