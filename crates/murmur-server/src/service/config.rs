use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use murmur_core::crypto::{EncryptionKey, SecretsCodec};
use murmur_core::{Error, Result};
use murmur_integration::oauth::StateSigner;
use murmur_webhook::reqwest::{ProviderClient, ReqwestConfig};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::service::security::RateLimitConfig;
use crate::service::{ServiceUrls, TRACING_TARGET};

/// Default values for configuration options.
mod defaults {
    /// Public base URL in development.
    pub const PUBLIC_URL: &str = "http://localhost:8080";

    /// Admin settings page in development.
    pub const SETTINGS_URL: &str = "http://localhost:3000/settings/integrations";

    /// OAuth state lifetime in seconds.
    pub const STATE_TTL_SECS: u64 = 600;
}

/// Minimum length of an OAuth state secret.
const MIN_STATE_SECRET_LEN: usize = 16;

/// App [`state`] configuration.
///
/// [`state`]: crate::service::ServiceState
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[builder(
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct ServiceConfig {
    /// Public base URL of this server, used to build OAuth redirect URIs
    #[cfg_attr(
        feature = "config",
        arg(long, env = "PUBLIC_URL", default_value = defaults::PUBLIC_URL)
    )]
    #[builder(default = "defaults::PUBLIC_URL.to_owned()")]
    pub public_url: String,

    /// Admin settings page the OAuth callback redirects to
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SETTINGS_URL", default_value = defaults::SETTINGS_URL)
    )]
    #[builder(default = "defaults::SETTINGS_URL.to_owned()")]
    pub settings_url: String,

    /// Hex encoded 32-byte master key sealing stored credentials
    #[cfg_attr(feature = "config", arg(long, env = "MASTER_ENCRYPTION_KEY"))]
    #[serde(default, skip_serializing)]
    #[builder(default)]
    pub encryption_key: Option<String>,

    /// Secret signing OAuth state tokens
    #[cfg_attr(feature = "config", arg(long, env = "OAUTH_STATE_SECRET"))]
    #[serde(default, skip_serializing)]
    #[builder(default)]
    pub state_secret: Option<String>,

    /// OAuth state lifetime in seconds
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OAUTH_STATE_TTL", default_value_t = defaults::STATE_TTL_SECS)
    )]
    #[builder(default = "defaults::STATE_TTL_SECS")]
    pub state_ttl_secs: u64,

    /// Provider HTTP client settings.
    #[cfg_attr(feature = "config", command(flatten))]
    #[builder(default)]
    pub http: ReqwestConfig,

    /// Inbound rate limiting settings.
    #[cfg_attr(feature = "config", command(flatten))]
    #[builder(default)]
    pub rate_limit: RateLimitConfig,
}

impl ServiceConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Validates values that clap cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        validate_url("public URL", &self.public_url)
            .and_then(|_| validate_url("settings URL", &self.settings_url))
            .and_then(|_| {
                validate_secrets(self.encryption_key.as_deref(), self.state_secret.as_deref())
            })
            .and_then(|_| validate_state_ttl(self.state_ttl_secs))
            .and_then(|_| validate_rate_limit(&self.rate_limit))
            .map_err(|message| Error::configuration().with_message(message))
    }

    /// Returns the public and settings URLs.
    pub fn urls(&self) -> Result<ServiceUrls> {
        let parse = |name: &'static str, value: &str| {
            Url::parse(value).map_err(|e| {
                Error::configuration()
                    .with_message(format!("invalid {name}"))
                    .with_source(e)
            })
        };

        Ok(ServiceUrls::new(
            parse("public URL", &self.public_url)?,
            parse("settings URL", &self.settings_url)?,
        ))
    }

    /// Loads the secrets codec from the configured master key.
    ///
    /// Without a key a random one is generated, so stored connections do not
    /// survive a restart.
    pub fn load_secrets_codec(&self) -> Result<SecretsCodec> {
        let key = match &self.encryption_key {
            Some(encoded) => EncryptionKey::from_hex(encoded)?,
            None => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    "No master encryption key configured, using an ephemeral key"
                );
                EncryptionKey::generate()
            }
        };

        Ok(SecretsCodec::new(key))
    }

    /// Creates the OAuth state signer.
    pub fn state_signer(&self) -> StateSigner {
        let ttl = Duration::from_secs(self.state_ttl_secs);
        match &self.state_secret {
            Some(secret) => StateSigner::new(secret.as_bytes(), ttl),
            None => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    "No OAuth state secret configured, using an ephemeral secret"
                );
                StateSigner::new(EncryptionKey::generate().as_bytes(), ttl)
            }
        }
    }

    /// Creates the provider HTTP client.
    pub fn provider_client(&self) -> Result<ProviderClient> {
        ProviderClient::new(self.http.clone())
    }
}

impl ServiceConfigBuilder {
    /// Wrapper for builder validation that returns String errors.
    fn validate(builder: &ServiceConfigBuilder) -> std::result::Result<(), String> {
        if let Some(public_url) = &builder.public_url {
            validate_url("public URL", public_url)?;
        }

        if let Some(settings_url) = &builder.settings_url {
            validate_url("settings URL", settings_url)?;
        }

        validate_secrets(
            builder.encryption_key.as_ref().and_then(Option::as_deref),
            builder.state_secret.as_ref().and_then(Option::as_deref),
        )?;

        if let Some(state_ttl_secs) = builder.state_ttl_secs {
            validate_state_ttl(state_ttl_secs)?;
        }

        if let Some(rate_limit) = &builder.rate_limit {
            validate_rate_limit(rate_limit)?;
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            public_url: defaults::PUBLIC_URL.to_owned(),
            settings_url: defaults::SETTINGS_URL.to_owned(),
            encryption_key: None,
            state_secret: None,
            state_ttl_secs: defaults::STATE_TTL_SECS,
            http: ReqwestConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn validate_url(name: &str, value: &str) -> std::result::Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("The {name} is invalid: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("The {name} must use http or https"));
    }

    Ok(())
}

fn validate_secrets(
    encryption_key: Option<&str>,
    state_secret: Option<&str>,
) -> std::result::Result<(), String> {
    if let Some(encoded) = encryption_key
        && EncryptionKey::from_hex(encoded).is_err()
    {
        return Err("The master encryption key must be 64 hexadecimal characters".to_owned());
    }

    if let Some(secret) = state_secret
        && secret.len() < MIN_STATE_SECRET_LEN
    {
        return Err(format!(
            "The OAuth state secret must be at least {MIN_STATE_SECRET_LEN} bytes"
        ));
    }

    Ok(())
}

fn validate_state_ttl(state_ttl_secs: u64) -> std::result::Result<(), String> {
    if !(60..=3600).contains(&state_ttl_secs) {
        return Err("The OAuth state TTL must be between 60 and 3600 seconds".to_owned());
    }

    Ok(())
}

fn validate_rate_limit(config: &RateLimitConfig) -> std::result::Result<(), String> {
    if config.capacity == 0 {
        return Err("The rate limit capacity must be greater than 0".to_owned());
    }

    if config.refill_rate.is_nan() || config.refill_rate <= 0.0 {
        return Err("The rate limit refill rate must be positive".to_owned());
    }

    if config.max_keys == 0 {
        return Err("The rate limiter must track at least one key".to_owned());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
        assert!(ServiceConfig::builder().build().is_ok());
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(
            ServiceConfig::builder()
                .with_public_url("ftp://example.com")
                .build()
                .is_err()
        );
        assert!(
            ServiceConfig::builder()
                .with_encryption_key("abcd")
                .build()
                .is_err()
        );
        assert!(
            ServiceConfig::builder()
                .with_state_secret("short")
                .build()
                .is_err()
        );
        assert!(
            ServiceConfig::builder()
                .with_rate_limit(RateLimitConfig::new(0, 1.0))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_codec_from_configured_key() {
        let key = "11".repeat(32);
        let config = ServiceConfig::builder()
            .with_encryption_key(key)
            .build()
            .unwrap();

        let codec = config.load_secrets_codec().unwrap();
        let workspace_id = uuid::Uuid::now_v7();
        let sealed = codec.seal(workspace_id, &Default::default()).unwrap();
        assert!(codec.open(workspace_id, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_validate_reports_configuration_error() {
        let config = ServiceConfig {
            state_ttl_secs: 5,
            ..ServiceConfig::default()
        };

        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), murmur_core::ErrorKind::Configuration);
    }
}
