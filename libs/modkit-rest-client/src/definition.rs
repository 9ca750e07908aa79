use serde::Deserialize;

use crate::auth::{ApiKeyLocation, AuthAnnotations, AuthScheme};
use crate::endpoint::EndpointSpec;
use crate::secret::SecretString;

/// A named remote API: base URL, shared auth metadata and its endpoints.
///
/// The base URL may contain `${property}` placeholders; they are expanded
/// when the client is built. An empty base URL falls back to
/// [`ApiClientConfig::base_url`](crate::ApiClientConfig::base_url).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiDefinition {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthAnnotations,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

impl ApiDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: String::new(),
            auth: AuthAnnotations::default(),
            endpoints: Vec::new(),
        }
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Default scheme for endpoints that do not select one.
    #[must_use]
    pub fn authenticated(mut self, scheme: AuthScheme) -> Self {
        self.auth = self.auth.with_scheme(scheme);
        self
    }

    #[must_use]
    pub fn basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Self {
        self.auth = self.auth.with_basic(username, password);
        self
    }

    #[must_use]
    pub fn api_key(
        mut self,
        name: impl Into<String>,
        value: impl Into<SecretString>,
        location: ApiKeyLocation,
    ) -> Self {
        self.auth = self.auth.with_api_key(name, value, location);
        self
    }

    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<SecretString>) -> Self {
        self.auth = self.auth.with_bearer(token);
        self
    }

    #[must_use]
    pub fn oauth2(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
        token_url: impl Into<String>,
    ) -> Self {
        self.auth = self.auth.with_oauth2(client_id, client_secret, token_url);
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoints.push(endpoint);
        self
    }
}
