//! Authentication schemes and their two-stage resolution.
//!
//! An API definition and each of its endpoints carry [`AuthAnnotations`]: an
//! optional scheme marker plus optional parameter blocks for every scheme.
//! [`resolve`] picks the scheme from the endpoint, falling back to the
//! definition, and then independently picks the parameter block the same way.

use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::oauth2::OAuth2Credentials;
use crate::secret::SecretString;

/// Scheme selected by an `authenticated` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    None,
    Basic,
    ApiKey,
    Bearer,
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::ApiKey => "api_key",
            Self::Bearer => "bearer",
            Self::OAuth2 => "oauth2",
        })
    }
}

/// Where an API key is attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicParams {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyParams {
    pub name: String,
    pub value: SecretString,
    #[serde(default)]
    pub location: ApiKeyLocation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BearerParams {
    pub token: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Params {
    pub client_id: String,
    pub client_secret: SecretString,
    pub token_url: String,
}

/// Authentication metadata declared at one level (definition or endpoint).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthAnnotations {
    pub scheme: Option<AuthScheme>,
    pub basic: Option<BasicParams>,
    pub api_key: Option<ApiKeyParams>,
    pub bearer: Option<BearerParams>,
    pub oauth2: Option<OAuth2Params>,
}

impl AuthAnnotations {
    #[must_use]
    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    #[must_use]
    pub fn with_basic(
        mut self,
        username: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Self {
        self.basic = Some(BasicParams {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn with_api_key(
        mut self,
        name: impl Into<String>,
        value: impl Into<SecretString>,
        location: ApiKeyLocation,
    ) -> Self {
        self.api_key = Some(ApiKeyParams {
            name: name.into(),
            value: value.into(),
            location,
        });
        self
    }

    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<SecretString>) -> Self {
        self.bearer = Some(BearerParams {
            token: token.into(),
        });
        self
    }

    #[must_use]
    pub fn with_oauth2(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
        token_url: impl Into<String>,
    ) -> Self {
        self.oauth2 = Some(OAuth2Params {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
        });
        self
    }
}

/// Fully resolved credentials for one endpoint.
#[derive(Debug, Clone, Default)]
pub enum AuthDeclaration {
    #[default]
    None,
    Basic {
        username: String,
        password: SecretString,
    },
    ApiKey {
        name: String,
        value: SecretString,
        location: ApiKeyLocation,
    },
    Bearer {
        token: SecretString,
    },
    OAuth2(OAuth2Credentials),
}

impl AuthDeclaration {
    #[must_use]
    pub fn scheme(&self) -> AuthScheme {
        match self {
            Self::None => AuthScheme::None,
            Self::Basic { .. } => AuthScheme::Basic,
            Self::ApiKey { .. } => AuthScheme::ApiKey,
            Self::Bearer { .. } => AuthScheme::Bearer,
            Self::OAuth2(_) => AuthScheme::OAuth2,
        }
    }
}

/// Resolves the credentials for an endpoint.
///
/// `scope` names the endpoint in error messages.
///
/// # Errors
/// Returns [`ConfigError::MissingAuthParameters`] if a scheme is selected but
/// neither level declares its parameters, and [`ConfigError::InvalidUrl`] if
/// an `OAuth2` token URL does not parse.
pub fn resolve(
    method: &AuthAnnotations,
    interface: &AuthAnnotations,
    scope: &str,
) -> Result<AuthDeclaration, ConfigError> {
    let Some(scheme) = method.scheme.or(interface.scheme) else {
        return Ok(AuthDeclaration::None);
    };

    let missing = || ConfigError::MissingAuthParameters {
        scope: scope.to_owned(),
        scheme,
    };

    let declaration = match scheme {
        AuthScheme::None => AuthDeclaration::None,
        AuthScheme::Basic => {
            let params = pick(method.basic.as_ref(), interface.basic.as_ref()).ok_or_else(missing)?;
            AuthDeclaration::Basic {
                username: params.username.clone(),
                password: params.password.clone(),
            }
        }
        AuthScheme::ApiKey => {
            let params =
                pick(method.api_key.as_ref(), interface.api_key.as_ref()).ok_or_else(missing)?;
            AuthDeclaration::ApiKey {
                name: params.name.clone(),
                value: params.value.clone(),
                location: params.location,
            }
        }
        AuthScheme::Bearer => {
            let params = pick(method.bearer.as_ref(), interface.bearer.as_ref()).ok_or_else(missing)?;
            AuthDeclaration::Bearer {
                token: params.token.clone(),
            }
        }
        AuthScheme::OAuth2 => {
            let params = pick(method.oauth2.as_ref(), interface.oauth2.as_ref()).ok_or_else(missing)?;
            let token_url = Url::parse(&params.token_url).map_err(|e| ConfigError::InvalidUrl {
                url: params.token_url.clone(),
                reason: e.to_string(),
            })?;
            AuthDeclaration::OAuth2(OAuth2Credentials::new(
                params.client_id.clone(),
                params.client_secret.clone(),
                token_url,
            ))
        }
    };

    Ok(declaration)
}

fn pick<'a, T>(method: Option<&'a T>, interface: Option<&'a T>) -> Option<&'a T> {
    method.or(interface)
}
