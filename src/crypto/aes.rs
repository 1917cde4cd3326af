use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Bytes added to every sealed buffer (leading nonce + trailing tag).
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Errors raised by the symmetric primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The cipher could not be initialised from the key material.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The system random source failed.
    #[error("Randomness unavailable: {0}")]
    Randomness(String),

    /// Sealing failed.
    #[error("Encryption failed")]
    Encrypt,

    /// Wrong key, truncated input or tampered ciphertext.
    #[error("Decryption failed: wrong key or corrupted data")]
    Decrypt,
}

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Creates a new `SecretKey` from a byte array.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Generates a new random AES-GCM nonce.
fn generate_nonce() -> Result<[u8; NONCE_SIZE], CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Randomness(e.to_string()))?;
    Ok(nonce)
}

/// Encrypts a plaintext using AES-256-GCM.
///
/// A fresh nonce is generated for every call and prepended to the output:
/// `nonce (12) || ciphertext || tag (16)`.
pub fn encrypt(plaintext: &[u8], key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let nonce_bytes = generate_nonce()?;
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypts a buffer produced by [`encrypt`].
///
/// Fails with [`CryptoError::Decrypt`] when the key is wrong, the input is
/// shorter than nonce + tag, or any byte was altered.
pub fn decrypt(sealed: &[u8], key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(CryptoError::Decrypt);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SecretKey {
        SecretKey::new([byte; KEY_SIZE])
    }

    #[test]
    fn round_trip() {
        let k = key(7);
        let sealed = encrypt(b"hello vault", &k).unwrap();
        assert_eq!(sealed.len(), b"hello vault".len() + SEAL_OVERHEAD);
        assert_eq!(decrypt(&sealed, &k).unwrap(), b"hello vault");
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let k = key(1);
        let sealed = encrypt(b"", &k).unwrap();
        assert_eq!(sealed.len(), SEAL_OVERHEAD);
        assert!(decrypt(&sealed, &k).unwrap().is_empty());
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let k = key(2);
        let a = encrypt(b"same", &k).unwrap();
        let b = encrypt(b"same", &k).unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let sealed = encrypt(b"payload", &key(3)).unwrap();
        assert_eq!(decrypt(&sealed, &key(4)), Err(CryptoError::Decrypt));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let k = key(5);
        let sealed = encrypt(b"payload", &k).unwrap();
        assert_eq!(decrypt(&sealed[..sealed.len() - 1], &k), Err(CryptoError::Decrypt));
        assert_eq!(decrypt(&sealed[..4], &k), Err(CryptoError::Decrypt));
    }

    #[test]
    fn tampered_input_is_rejected() {
        let k = key(6);
        let mut sealed = encrypt(b"payload", &k).unwrap();
        sealed[NONCE_SIZE] ^= 0x01;
        assert_eq!(decrypt(&sealed, &k), Err(CryptoError::Decrypt));
    }
}
