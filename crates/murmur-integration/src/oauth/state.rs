//! Signed, single-use OAuth `state` tokens.
//!
//! The state is an HS256 JWT binding the integration type, workspace, acting
//! member and a random nonce. A callback is accepted only while the token is
//! inside its validity window, only for the integration it was issued for,
//! and only once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use jiff::Timestamp;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use murmur_core::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TRACING_TARGET;
use crate::connection::ConfigMap;
use crate::definition::IntegrationType;

/// Issuer claim on every state token.
const STATE_ISSUER: &str = "murmur:oauth-state";

/// Default validity window of a state token.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default upper bound on remembered nonces.
pub const DEFAULT_MAX_CONSUMED: usize = 10_000;

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    iss: String,
    typ: IntegrationType,
    wid: Uuid,
    mid: Uuid,
    nonce: Uuid,
    iat: i64,
    exp: i64,
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    fld: ConfigMap,
}

/// Verified contents of a state token.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthState {
    /// Integration the flow was started for.
    pub integration_type: IntegrationType,
    /// Workspace that will own the connection.
    pub workspace_id: Uuid,
    /// Member who started the flow.
    pub member_id: Uuid,
    /// Single-use nonce.
    pub nonce: Uuid,
    /// Issuance time.
    pub issued_at: Timestamp,
    /// Non-secret fields collected before redirecting.
    pub fields: ConfigMap,
}

/// Issues and verifies state tokens.
pub struct StateSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    max_consumed: usize,
    consumed: Mutex<HashMap<Uuid, i64>>,
}

impl std::fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSigner")
            .field("ttl", &self.ttl)
            .field("max_consumed", &self.max_consumed)
            .finish_non_exhaustive()
    }
}

impl StateSigner {
    /// Creates a signer with the given HMAC secret and validity window.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
            max_consumed: DEFAULT_MAX_CONSUMED,
            consumed: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the upper bound on remembered nonces.
    pub fn with_max_consumed(mut self, max_consumed: usize) -> Self {
        self.max_consumed = max_consumed.max(1);
        self
    }

    /// Returns the validity window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a state token now.
    pub fn sign(
        &self,
        integration_type: IntegrationType,
        workspace_id: Uuid,
        member_id: Uuid,
        fields: ConfigMap,
    ) -> Result<String> {
        self.sign_at(integration_type, workspace_id, member_id, fields, Timestamp::now())
    }

    /// Issues a state token as of `issued_at`.
    pub fn sign_at(
        &self,
        integration_type: IntegrationType,
        workspace_id: Uuid,
        member_id: Uuid,
        fields: ConfigMap,
        issued_at: Timestamp,
    ) -> Result<String> {
        let iat = issued_at.as_second();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);

        let claims = StateClaims {
            iss: STATE_ISSUER.to_owned(),
            typ: integration_type,
            wid: workspace_id,
            mid: member_id,
            nonce: Uuid::new_v4(),
            iat,
            exp: iat.saturating_add(ttl),
            fld: fields,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            Error::internal_error()
                .with_message("Failed to sign OAuth state")
                .with_source(e)
        })
    }

    /// Verifies a state token for `expected` and consumes its nonce.
    ///
    /// Fails closed on a bad signature, expiry, a different integration type,
    /// a nonce that was already used or a full nonce ledger.
    pub fn verify(&self, token: &str, expected: IntegrationType) -> Result<OAuthState> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[STATE_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let claims = decode::<StateClaims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::warn!(
                    target: TRACING_TARGET,
                    integration_type = %expected,
                    error = %e,
                    "Rejected OAuth state token"
                );
                Error::authentication()
                    .with_message("Invalid or expired OAuth state")
                    .with_source(e)
            })?
            .claims;

        if claims.typ != expected {
            tracing::warn!(
                target: TRACING_TARGET,
                expected = %expected,
                actual = %claims.typ,
                "OAuth state issued for a different integration"
            );
            return Err(Error::authentication().with_message("OAuth state integration mismatch"));
        }

        self.consume(claims.nonce, claims.exp)?;

        Ok(OAuthState {
            integration_type: claims.typ,
            workspace_id: claims.wid,
            member_id: claims.mid,
            nonce: claims.nonce,
            issued_at: Timestamp::from_second(claims.iat).unwrap_or(Timestamp::UNIX_EPOCH),
            fields: claims.fld,
        })
    }

    /// Records a nonce as used, rejecting replays.
    fn consume(&self, nonce: Uuid, expires_at: i64) -> Result<()> {
        let now = Timestamp::now().as_second();
        let mut consumed = self
            .consumed
            .lock()
            .map_err(|_| Error::internal_error().with_message("OAuth nonce ledger poisoned"))?;

        consumed.retain(|_, exp| *exp >= now);

        if consumed.contains_key(&nonce) {
            tracing::warn!(
                target: TRACING_TARGET,
                nonce = %nonce,
                "Replayed OAuth state token"
            );
            return Err(Error::authentication().with_message("OAuth state already used"));
        }

        // Unexpired nonces are never forgotten, so a full ledger rejects.
        if consumed.len() >= self.max_consumed {
            tracing::warn!(
                target: TRACING_TARGET,
                capacity = self.max_consumed,
                "OAuth nonce ledger is full"
            );
            return Err(Error::service_unavailable()
                .with_message("Too many OAuth flows in progress, try again later"));
        }

        consumed.insert(nonce, expires_at);
        Ok(())
    }
}
