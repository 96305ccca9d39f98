//! HMAC signature schemes used by inbound provider webhooks.
//!
//! Every scheme fails closed: a missing header, an unparsable header or an
//! empty secret is a rejection, never a skipped check. Digests are compared
//! in constant time over the full expected length, so a short or long
//! candidate does not return early.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use sha1::Sha1;
use sha2::Sha256;
use strum::{AsRefStr, Display};
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Header carrying `sha256=<hex>` signatures.
pub const HUB_SIGNATURE_256: &str = "x-hub-signature-256";

/// Header carrying raw hex HMAC-SHA256 signatures.
pub const PAYLOAD_SIGNATURE: &str = "payload-signature";

/// Header carrying base64 HMAC-SHA1 signatures.
pub const X_SIGNATURE: &str = "x-signature";

/// Prefix expected on [`HUB_SIGNATURE_256`] values.
const SHA256_PREFIX: &str = "sha256=";

/// Reasons a signature check rejects a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The signature header was not sent.
    #[error("missing signature header")]
    MissingHeader,
    /// The header value could not be decoded.
    #[error("malformed signature header")]
    Malformed,
    /// No secret is configured to verify against.
    #[error("no signing secret configured")]
    MissingSecret,
    /// The digest does not match the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Signature schemes supported for inbound webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SignatureScheme {
    /// `X-Hub-Signature-256: sha256=<hex HMAC-SHA256>`.
    PrefixedSha256,
    /// `Payload-Signature: <hex HMAC-SHA256>`.
    HexSha256,
    /// `x-signature: <base64 HMAC-SHA1>`.
    Base64Sha1,
}

impl SignatureScheme {
    /// Returns the header this scheme reads.
    pub const fn header(&self) -> &'static str {
        match self {
            Self::PrefixedSha256 => HUB_SIGNATURE_256,
            Self::HexSha256 => PAYLOAD_SIGNATURE,
            Self::Base64Sha1 => X_SIGNATURE,
        }
    }

    /// Computes the raw digest of `body` under `secret`.
    pub fn digest(&self, secret: &[u8], body: &[u8]) -> Vec<u8> {
        match self {
            Self::PrefixedSha256 | Self::HexSha256 => {
                let mut mac =
                    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
                mac.update(body);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Base64Sha1 => {
                let mut mac =
                    HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
                mac.update(body);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    /// Produces the header value a provider would send for `body`.
    pub fn sign(&self, secret: &[u8], body: &[u8]) -> String {
        let digest = self.digest(secret, body);
        match self {
            Self::PrefixedSha256 => format!("{SHA256_PREFIX}{}", hex::encode(digest)),
            Self::HexSha256 => hex::encode(digest),
            Self::Base64Sha1 => BASE64.encode(digest),
        }
    }

    /// Decodes a header value into raw digest bytes.
    fn decode(&self, value: &str) -> Result<Vec<u8>, SignatureError> {
        let value = value.trim();
        let decoded = match self {
            Self::PrefixedSha256 => {
                let encoded = value
                    .strip_prefix(SHA256_PREFIX)
                    .ok_or(SignatureError::Malformed)?;
                hex::decode(encoded).ok()
            }
            Self::HexSha256 => hex::decode(value).ok(),
            Self::Base64Sha1 => BASE64.decode(value).ok(),
        };

        decoded.ok_or(SignatureError::Malformed)
    }

    /// Verifies the signature header in `headers` against `body`.
    pub fn verify(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        secret: &str,
    ) -> Result<(), SignatureError> {
        let value = headers
            .get(self.header())
            .ok_or(SignatureError::MissingHeader)?
            .to_str()
            .map_err(|_| SignatureError::Malformed)?;

        self.verify_value(value, body, secret)
    }

    /// Verifies a raw header value against `body`.
    pub fn verify_value(&self, value: &str, body: &[u8], secret: &str) -> Result<(), SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::MissingSecret);
        }

        let provided = self.decode(value)?;
        let expected = self.digest(secret.as_bytes(), body);

        if constant_time_matches(&expected, &provided) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Compares `provided` against `expected` without branching on content or length.
///
/// The candidate is copied into a buffer of the expected length so the
/// comparison always touches the same number of bytes.
pub fn constant_time_matches(expected: &[u8], provided: &[u8]) -> bool {
    let mut padded = vec![0u8; expected.len()];
    let overlap = provided.len().min(expected.len());
    padded[..overlap].copy_from_slice(&provided[..overlap]);

    let same_length = Choice::from(u8::from(provided.len() == expected.len()));
    (padded.ct_eq(expected) & same_length).into()
}
