//! Endpoint metadata: the declarative [`EndpointSpec`] and the validated,
//! immutable [`EndpointDescriptor`] derived from it at client-build time.

use std::fmt;
use std::sync::LazyLock;

use http::{HeaderName, HeaderValue};
use regex::Regex;
use serde::Deserialize;

use crate::auth::{self, ApiKeyLocation, AuthAnnotations, AuthDeclaration, AuthScheme};
use crate::error::ConfigError;
use crate::secret::SecretString;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
pub(crate) static PATH_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^{}]+)\}").expect("static regex should not panic")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Options,
}

impl HttpVerb {
    #[must_use]
    pub fn method(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Delete => http::Method::DELETE,
            Self::Options => http::Method::OPTIONS,
        }
    }

    /// Whether a body-bound argument is sent with this verb.
    #[must_use]
    pub fn accepts_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Role of one positional call argument.
///
/// In a schema document: `{"path": "id"}`, `{"query": "page"}`, `"headers"`
/// or `"body"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamBinding {
    /// Substituted into the `{name}` placeholder of the path template.
    Path(String),
    /// Appended as a query parameter.
    Query(String),
    /// A map of extra request headers.
    Headers,
    /// Serialized as the JSON request body.
    Body,
}

/// How a success body is turned into the declared return type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// `application/json`, decoded with serde.
    #[default]
    Json,
    /// Raw text, never parsed.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticHeader {
    pub name: String,
    pub value: String,
}

/// Declarative endpoint metadata, as written by the API author.
///
/// Built with the fluent methods or deserialized from a schema document.
///
/// ```ignore
/// EndpointSpec::post("create_user", "/users")
///     .header("Accept", "application/json")
///     .body()
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSpec {
    pub id: String,
    #[serde(default)]
    pub verb: Option<HttpVerb>,
    pub path: String,
    #[serde(default)]
    pub params: Vec<ParamBinding>,
    #[serde(default)]
    pub headers: Vec<StaticHeader>,
    #[serde(default)]
    pub auth: AuthAnnotations,
    #[serde(default)]
    pub response: ResponseKind,
}

impl EndpointSpec {
    /// An endpoint without a verb; one must be set before the client is built.
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            verb: None,
            path: path.into(),
            params: Vec::new(),
            headers: Vec::new(),
            auth: AuthAnnotations::default(),
            response: ResponseKind::default(),
        }
    }

    pub fn get(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, path).verb(HttpVerb::Get)
    }

    pub fn post(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, path).verb(HttpVerb::Post)
    }

    pub fn put(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, path).verb(HttpVerb::Put)
    }

    pub fn delete(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, path).verb(HttpVerb::Delete)
    }

    pub fn options(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, path).verb(HttpVerb::Options)
    }

    #[must_use]
    pub fn verb(mut self, verb: HttpVerb) -> Self {
        self.verb = Some(verb);
        self
    }

    /// Binds the next argument to the `{name}` placeholder.
    #[must_use]
    pub fn path_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamBinding::Path(name.into()));
        self
    }

    /// Binds the next argument to query parameter `name`.
    #[must_use]
    pub fn query_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamBinding::Query(name.into()));
        self
    }

    /// Binds the next argument as a header map.
    #[must_use]
    pub fn header_map(mut self) -> Self {
        self.params.push(ParamBinding::Headers);
        self
    }

    /// Binds the next argument as the JSON body.
    #[must_use]
    pub fn body(mut self) -> Self {
        self.params.push(ParamBinding::Body);
        self
    }

    /// Adds a header sent with every call.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(StaticHeader {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn returns_text(mut self) -> Self {
        self.response = ResponseKind::Text;
        self
    }

    /// Selects the scheme for this endpoint, overriding the definition's.
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
}

/// Validated per-endpoint metadata. Immutable once built.
#[derive(Debug)]
pub struct EndpointDescriptor {
    id: String,
    verb: HttpVerb,
    path_template: String,
    body_param: Option<usize>,
    path_params: Vec<(String, usize)>,
    query_params: Vec<(String, usize)>,
    header_params: Vec<usize>,
    static_headers: Vec<(HeaderName, HeaderValue)>,
    auth: AuthDeclaration,
    response: ResponseKind,
    arity: usize,
}

impl EndpointDescriptor {
    /// Validates `spec` and resolves its credentials against the
    /// definition-level `interface_auth`.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingVerb`], [`ConfigError::InvalidHeader`] or
    /// any error of [`auth::resolve`].
    pub fn from_spec(
        api_name: &str,
        spec: &EndpointSpec,
        interface_auth: &AuthAnnotations,
    ) -> Result<Self, ConfigError> {
        let scope = format!("{api_name}.{}", spec.id);

        let verb = spec.verb.ok_or_else(|| ConfigError::MissingVerb {
            endpoint: scope.clone(),
        })?;

        let mut body_param = None;
        let mut path_params = Vec::new();
        let mut query_params = Vec::new();
        let mut header_params = Vec::new();
        for (index, binding) in spec.params.iter().enumerate() {
            match binding {
                ParamBinding::Path(name) => path_params.push((name.clone(), index)),
                ParamBinding::Query(name) => query_params.push((name.clone(), index)),
                ParamBinding::Headers => header_params.push(index),
                ParamBinding::Body => {
                    if body_param.is_none() {
                        body_param = Some(index);
                    } else {
                        tracing::warn!(endpoint = %scope, index, "extra body parameter ignored");
                    }
                }
            }
        }

        for placeholder in placeholders(&spec.path) {
            if !path_params.iter().any(|(name, _)| name == placeholder) {
                tracing::warn!(
                    endpoint = %scope,
                    placeholder,
                    "path placeholder has no bound argument and will be sent verbatim"
                );
            }
        }

        let static_headers = spec
            .headers
            .iter()
            .map(|header| parse_header(&header.name, &header.value))
            .collect::<Result<Vec<_>, _>>()?;

        let auth = auth::resolve(&spec.auth, interface_auth, &scope)?;

        Ok(Self {
            id: spec.id.clone(),
            verb,
            path_template: spec.path.clone(),
            body_param,
            path_params,
            query_params,
            header_params,
            static_headers,
            auth,
            response: spec.response,
            arity: spec.params.len(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn verb(&self) -> HttpVerb {
        self.verb
    }

    #[must_use]
    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    /// Index of the first body-bound argument.
    #[must_use]
    pub fn body_param(&self) -> Option<usize> {
        self.body_param
    }

    #[must_use]
    pub fn path_params(&self) -> &[(String, usize)] {
        &self.path_params
    }

    /// Query bindings in declaration order.
    #[must_use]
    pub fn query_params(&self) -> &[(String, usize)] {
        &self.query_params
    }

    #[must_use]
    pub fn header_params(&self) -> &[usize] {
        &self.header_params
    }

    #[must_use]
    pub fn static_headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.static_headers
    }

    #[must_use]
    pub fn auth(&self) -> &AuthDeclaration {
        &self.auth
    }

    #[must_use]
    pub fn response(&self) -> ResponseKind {
        self.response
    }

    /// Number of positional arguments a call must supply.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }
}

/// `{name}` placeholders of a path template, in order.
pub(crate) fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    PATH_PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })?;
    Ok((header_name, header_value))
}
