//! Per-workspace sealing of integration secrets.

use serde_json::{Map, Value};
use uuid::Uuid;

use super::TRACING_TARGET;
use super::cipher::{decrypt_json, encrypt_json};
use super::error::CryptoResult;
use super::key::EncryptionKey;

/// Decrypted secret fields of one integration connection.
pub type SecretMap = Map<String, Value>;

/// Seals and opens connection secrets.
///
/// Holds the master key for the lifetime of the process. Every call derives
/// the workspace key afresh so that decrypted material never outlives the
/// request that needed it.
#[derive(Debug, Clone)]
pub struct SecretsCodec {
    master: EncryptionKey,
}

impl SecretsCodec {
    /// Creates a codec around the given master key.
    pub fn new(master: EncryptionKey) -> Self {
        Self { master }
    }

    /// Encrypts `secrets` for `workspace_id`.
    pub fn seal(&self, workspace_id: Uuid, secrets: &SecretMap) -> CryptoResult<Vec<u8>> {
        let key = self.master.derive_workspace_key(workspace_id)?;
        let sealed = encrypt_json(&key, secrets)?;

        tracing::trace!(
            target: TRACING_TARGET,
            workspace_id = %workspace_id,
            fields = secrets.len(),
            "Sealed integration secrets"
        );

        Ok(sealed)
    }

    /// Decrypts secrets previously sealed for `workspace_id`.
    pub fn open(&self, workspace_id: Uuid, sealed: &[u8]) -> CryptoResult<SecretMap> {
        let key = self.master.derive_workspace_key(workspace_id)?;
        decrypt_json(&key, sealed).inspect_err(|error| {
            tracing::warn!(
                target: TRACING_TARGET,
                workspace_id = %workspace_id,
                error = %error,
                "Failed to open integration secrets"
            );
        })
    }
}
