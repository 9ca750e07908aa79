use std::fmt;

use url::Url;

use crate::secret::SecretString;

/// Client credentials for the `client_credentials` / `refresh_token` grants.
#[derive(Clone)]
pub struct OAuth2Credentials {
    client_id: String,
    client_secret: SecretString,
    token_url: Url,
}

impl OAuth2Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
        token_url: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Token cache key: `client_id@token_url`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.client_id, self.token_url)
    }
}

impl fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_url", &self.token_url.as_str())
            .finish()
    }
}
