//! XChaCha20-Poly1305 authenticated encryption.
//!
//! # Wire Format
//!
//! `nonce (24 bytes) || ciphertext || tag (16 bytes)`
//!
//! The 24-byte nonce is random per call, which XChaCha20 tolerates without
//! a meaningful collision risk.

use chacha20poly1305::XChaCha20Poly1305;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};

use super::error::{CryptoError, CryptoResult};
use super::key::EncryptionKey;

/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Minimum size of valid ciphertext (nonce + tag, no plaintext).
pub const MIN_CIPHERTEXT_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Encrypts plaintext, returning the ciphertext with the nonce prepended.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypts ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// - [`CryptoError::CiphertextTooShort`] if the input cannot hold a nonce and tag
/// - [`CryptoError::DecryptionFailed`] on a wrong key, corruption or tampering
pub fn decrypt(key: &EncryptionKey, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < MIN_CIPHERTEXT_SIZE {
        return Err(CryptoError::CiphertextTooShort);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);

    cipher
        .decrypt(nonce_bytes.into(), encrypted)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Serializes a value as JSON, then encrypts it.
pub fn encrypt_json<T: serde::Serialize>(key: &EncryptionKey, value: &T) -> CryptoResult<Vec<u8>> {
    let json = serde_json::to_vec(value).map_err(|e| CryptoError::Json(e.to_string()))?;
    encrypt(key, &json)
}

/// Decrypts a ciphertext, then deserializes the JSON it contains.
pub fn decrypt_json<T: serde::de::DeserializeOwned>(
    key: &EncryptionKey,
    ciphertext: &[u8],
) -> CryptoResult<T> {
    let plaintext = decrypt(key, ciphertext)?;
    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Json(e.to_string()))
}
