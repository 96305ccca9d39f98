//! Secrets codec for integration credentials at rest.
//!
//! Credentials are serialized as JSON and encrypted with XChaCha20-Poly1305
//! under a key derived per workspace from the process master key.
//!
//! # Example
//!
//! ```rust,ignore
//! use murmur_core::crypto::{EncryptionKey, SecretsCodec};
//!
//! let codec = SecretsCodec::new(EncryptionKey::generate());
//! let sealed = codec.seal(workspace_id, &secrets)?;
//! assert_eq!(codec.open(workspace_id, &sealed)?, secrets);
//! ```

mod cipher;
mod codec;
mod error;
mod key;

pub use cipher::{MIN_CIPHERTEXT_SIZE, NONCE_SIZE, TAG_SIZE, decrypt, encrypt};
pub use codec::{SecretMap, SecretsCodec};
pub use error::{CryptoError, CryptoResult};
pub use key::{EncryptionKey, KEY_SIZE};

/// Tracing target for secrets codec operations.
pub const TRACING_TARGET: &str = "murmur_core::crypto";
