use murmur_integration::IntegrationType;
use url::Url;

/// Externally visible URLs the handlers redirect to.
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    public_url: Url,
    settings_url: Url,
}

impl ServiceUrls {
    /// Creates the URL set.
    pub fn new(public_url: Url, settings_url: Url) -> Self {
        Self {
            public_url,
            settings_url,
        }
    }

    /// Returns the OAuth callback URL registered with the provider.
    pub fn redirect_uri(&self, integration_type: IntegrationType) -> String {
        format!(
            "{}/oauth/{}/callback",
            self.public_url.as_str().trim_end_matches('/'),
            integration_type
        )
    }

    /// Returns the settings page URL reporting a connection outcome.
    pub fn settings_redirect(
        &self,
        integration_type: &str,
        status: &str,
        reason: Option<&str>,
    ) -> Url {
        let mut url = self.settings_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("integration", integration_type)
                .append_pair("status", status);
            if let Some(reason) = reason {
                query.append_pair("reason", reason);
            }
        }
        url
    }
}
