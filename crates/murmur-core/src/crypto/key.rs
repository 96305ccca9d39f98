//! Master and workspace encryption keys.

use std::fmt;
use std::str::FromStr;

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

use super::error::{CryptoError, CryptoResult};

/// The size of an XChaCha20-Poly1305 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Domain separation string for workspace key derivation.
const WORKSPACE_KEY_INFO: &[u8] = b"murmur-integration-secrets-v1";

/// A 256-bit encryption key for XChaCha20-Poly1305.
///
/// The master key lives for the whole process; workspace keys are derived
/// from it on demand and dropped after use.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Creates a new encryption key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self { bytes })
    }

    /// Parses a key from its 64-character hex representation.
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(encoded.trim()).map_err(|_| CryptoError::InvalidKeyEncoding)?;
        Self::from_bytes(&bytes)
    }

    /// Generates a new random encryption key using a cryptographically secure RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Returns the raw key bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives a workspace-specific encryption key using HKDF-SHA256.
    ///
    /// The workspace id is the salt, so two tenants never share a key even
    /// though both derive from the same master key.
    pub fn derive_workspace_key(&self, workspace_id: Uuid) -> CryptoResult<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(workspace_id.as_bytes()), &self.bytes);

        let mut derived_key = [0u8; KEY_SIZE];
        hkdf.expand(WORKSPACE_KEY_INFO, &mut derived_key)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        Ok(Self { bytes: derived_key })
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl FromStr for EncryptionKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<&[u8]> for EncryptionKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_from_bytes_invalid_length() {
        assert_eq!(
            EncryptionKey::from_bytes(&[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKeyLength
        );
    }

    #[test]
    fn test_from_hex() {
        let encoded = "ab".repeat(KEY_SIZE);
        let key: EncryptionKey = encoded.parse().unwrap();
        assert_eq!(key.as_bytes(), &[0xAB; KEY_SIZE]);

        assert_eq!(
            EncryptionKey::from_hex("not-hex").unwrap_err(),
            CryptoError::InvalidKeyEncoding
        );
        assert_eq!(
            EncryptionKey::from_hex("abcd").unwrap_err(),
            CryptoError::InvalidKeyLength
        );
    }

    #[test]
    fn test_debug_redacts_bytes() {
        let key = EncryptionKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains('7'));
    }

    #[test]
    fn test_workspace_keys_differ_per_workspace() {
        let master = EncryptionKey::generate();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let key_a = master.derive_workspace_key(a).unwrap();
        let key_a_again = master.derive_workspace_key(a).unwrap();
        let key_b = master.derive_workspace_key(b).unwrap();

        assert_eq!(key_a.as_bytes(), key_a_again.as_bytes());
        assert_ne!(key_a.as_bytes(), key_b.as_bytes());
        assert_ne!(key_a.as_bytes(), master.as_bytes());
    }
}
