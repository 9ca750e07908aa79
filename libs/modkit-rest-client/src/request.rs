//! Turns an endpoint descriptor, resolved credentials and call arguments into
//! a wire request.
//!
//! Header order on the wire: static headers, then per-call header maps, then
//! the authentication header.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method, Request};
use http_body_util::Full;
use serde_json::Value;
use url::Url;

use crate::auth::{ApiKeyLocation, AuthDeclaration};
use crate::endpoint::{EndpointDescriptor, PATH_PLACEHOLDER, parse_header};
use crate::error::{ApiError, ConfigError, TransportError};
use crate::oauth2::{TokenError, TokenManager};
use crate::secret::SecretString;

const JSON_CONTENT_TYPE: &str = "application/json";

/// A fully formed outbound request. Built fresh per call.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    /// In wire order; duplicates are kept.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Option<Bytes>,
    /// Set together with `body`.
    pub content_type: Option<HeaderValue>,
}

impl WireRequest {
    /// # Errors
    /// Returns [`TransportError::RequestBuild`] if the URL is not a valid URI.
    pub fn into_http(self) -> Result<Request<Full<Bytes>>, TransportError> {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.url.as_str());

        let has_content_type = self.headers.iter().any(|(name, _)| name == CONTENT_TYPE);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        if let Some(content_type) = self.content_type
            && !has_content_type
        {
            builder = builder.header(CONTENT_TYPE, content_type);
        }

        Ok(builder.body(Full::new(self.body.unwrap_or_default()))?)
    }
}

/// Credentials turned into their on-the-wire form for one call.
#[derive(Debug, Clone, Default)]
pub enum AppliedAuth {
    #[default]
    None,
    Header(HeaderName, HeaderValue),
    Query(String, SecretString),
}

/// Materializes the endpoint's credentials, fetching an `OAuth2` token if
/// needed.
///
/// # Errors
/// Returns [`ApiError::Token`] if the token cannot be obtained and
/// [`ApiError::Config`] if a credential is not a valid header value.
pub(crate) async fn materialize_auth(
    auth: &AuthDeclaration,
    tokens: Option<&TokenManager>,
) -> Result<AppliedAuth, ApiError> {
    let applied = match auth {
        AuthDeclaration::None => AppliedAuth::None,
        AuthDeclaration::Basic { username, password } => {
            let encoded = STANDARD.encode(format!("{username}:{}", password.expose()));
            authorization(&format!("Basic {encoded}"))?
        }
        AuthDeclaration::ApiKey {
            name,
            value,
            location: ApiKeyLocation::Header,
        } => {
            let (name, mut value) = parse_header(name, value.expose())?;
            value.set_sensitive(true);
            AppliedAuth::Header(name, value)
        }
        AuthDeclaration::ApiKey {
            name,
            value,
            location: ApiKeyLocation::Query,
        } => AppliedAuth::Query(name.clone(), value.clone()),
        AuthDeclaration::Bearer { token } => authorization(&format!("Bearer {}", token.expose()))?,
        AuthDeclaration::OAuth2(credentials) => {
            let tokens = tokens.ok_or_else(|| {
                TokenError::Unavailable("no token manager configured".to_owned())
            })?;
            let token = tokens.get_token(credentials).await?;
            authorization(&format!("Bearer {}", token.expose()))?
        }
    };
    Ok(applied)
}

fn authorization(value: &str) -> Result<AppliedAuth, ConfigError> {
    let mut value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
        name: AUTHORIZATION.to_string(),
        reason: e.to_string(),
    })?;
    value.set_sensitive(true);
    Ok(AppliedAuth::Header(AUTHORIZATION, value))
}

/// Builds the wire request for one call.
///
/// # Errors
/// Returns a [`ConfigError`] if the arguments do not fit the descriptor or the
/// resulting URL is invalid.
pub(crate) fn build_request(
    descriptor: &EndpointDescriptor,
    base_url: &str,
    args: &[Value],
    auth: &AppliedAuth,
) -> Result<WireRequest, ConfigError> {
    check_arity(descriptor, args.len())?;

    let mut bindings = Vec::with_capacity(descriptor.path_params().len());
    for (name, index) in descriptor.path_params() {
        let value = &args[*index];
        if value.is_null() {
            return Err(ConfigError::NullPathArgument {
                endpoint: descriptor.id().to_owned(),
                name: name.clone(),
            });
        }
        bindings.push((name.as_str(), natural_string(value)));
    }
    let path = substitute_path(descriptor.path_template(), &bindings);

    let raw_url = join_url(base_url, &path);
    let mut url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidUrl {
        url: raw_url.clone(),
        reason: e.to_string(),
    })?;

    let query: Vec<_> = descriptor
        .query_params()
        .iter()
        .filter(|(_, index)| !args[*index].is_null())
        .map(|(name, index)| (name.as_str(), natural_string(&args[*index])))
        .collect();
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &query {
            pairs.append_pair(name, value);
        }
    }

    let mut headers = descriptor.static_headers().to_vec();
    for index in descriptor.header_params() {
        append_header_map(descriptor, *index, &args[*index], &mut headers)?;
    }

    let body = match descriptor.body_param() {
        Some(index) if descriptor.verb().accepts_body() && !args[index].is_null() => {
            let encoded = serde_json::to_vec(&args[index])
                .map_err(|source| ConfigError::ArgumentEncode { index, source })?;
            Some(Bytes::from(encoded))
        }
        _ => None,
    };

    match auth {
        AppliedAuth::None => {}
        AppliedAuth::Header(name, value) => headers.push((name.clone(), value.clone())),
        AppliedAuth::Query(name, value) => {
            url.query_pairs_mut().append_pair(name, value.expose());
        }
    }

    Ok(WireRequest {
        method: descriptor.verb().method(),
        url,
        headers,
        content_type: body
            .is_some()
            .then(|| HeaderValue::from_static(JSON_CONTENT_TYPE)),
        body,
    })
}

pub(crate) fn check_arity(descriptor: &EndpointDescriptor, actual: usize) -> Result<(), ConfigError> {
    if actual == descriptor.arity() {
        return Ok(());
    }
    Err(ConfigError::ArityMismatch {
        endpoint: descriptor.id().to_owned(),
        expected: descriptor.arity(),
        actual,
    })
}

fn append_header_map(
    descriptor: &EndpointDescriptor,
    index: usize,
    arg: &Value,
    headers: &mut Vec<(HeaderName, HeaderValue)>,
) -> Result<(), ConfigError> {
    let not_map = || ConfigError::HeaderArgumentNotMap {
        endpoint: descriptor.id().to_owned(),
        index,
    };
    let Value::Object(map) = arg else {
        return Err(not_map());
    };
    for (name, value) in map {
        if value.is_null() {
            continue;
        }
        let value = value.as_str().ok_or_else(not_map)?;
        headers.push(parse_header(name, value)?);
    }
    Ok(())
}

/// Replaces each `{name}` of the template with its bound value in one pass.
/// Placeholders without a binding are left as they are; substituted values
/// are never rescanned.
#[must_use]
pub(crate) fn substitute_path(template: &str, bindings: &[(&str, String)]) -> String {
    PATH_PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            bindings
                .iter()
                .find(|(bound, _)| *bound == name)
                .map_or_else(|| caps[0].to_owned(), |(_, value)| value.clone())
        })
        .into_owned()
}

/// Strings are used as they are; everything else uses its JSON text.
fn natural_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    if path.is_empty() {
        return base_url.to_owned();
    }
    if path.starts_with('/') {
        format!("{}{path}", base_url.trim_end_matches('/'))
    } else if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::auth::AuthAnnotations;
    use crate::endpoint::EndpointSpec;
    use serde_json::json;

    const BASE: &str = "https://api.example.com/v1";

    fn descriptor(spec: EndpointSpec) -> EndpointDescriptor {
        EndpointDescriptor::from_spec("UserApi", &spec, &AuthAnnotations::default()).unwrap()
    }

    fn header_pairs(request: &WireRequest) -> Vec<(String, String)> {
        request
            .headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_str().unwrap().to_owned()))
            .collect()
    }

    #[test]
    fn substitutes_path_arguments() {
        let d = descriptor(
            EndpointSpec::get("get_post", "/users/{id}/posts/{post}")
                .path_param("id")
                .path_param("post"),
        );
        let request = build_request(&d, BASE, &[json!(42), json!("intro")], &AppliedAuth::None)
            .unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.url.as_str(),
            "https://api.example.com/v1/users/42/posts/intro"
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn unmatched_placeholder_stays_verbatim() {
        assert_eq!(
            substitute_path("/users/{id}/posts/{post}", &[("id", "7".to_owned())]),
            "/users/7/posts/{post}"
        );
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        assert_eq!(
            substitute_path(
                "/a/{x}/{y}",
                &[("x", "{y}".to_owned()), ("y", "z".to_owned())]
            ),
            "/a/{y}/z"
        );
    }

    #[test]
    fn null_path_argument_is_rejected() {
        let d = descriptor(EndpointSpec::get("get_user", "/users/{id}").path_param("id"));
        let err = build_request(&d, BASE, &[Value::Null], &AppliedAuth::None).unwrap_err();
        assert!(matches!(err, ConfigError::NullPathArgument { ref name, .. } if name == "id"));
    }

    #[test]
    fn query_parameters_follow_declaration_order_and_skip_nulls() {
        let d = descriptor(
            EndpointSpec::get("search", "/users")
                .query_param("q")
                .query_param("page")
                .query_param("tag"),
        );
        let request = build_request(
            &d,
            BASE,
            &[json!("ann smith"), Value::Null, json!(true)],
            &AppliedAuth::None,
        )
        .unwrap();
        assert_eq!(request.url.query(), Some("q=ann+smith&tag=true"));
    }

    #[test]
    fn arity_is_checked() {
        let d = descriptor(EndpointSpec::get("get_user", "/users/{id}").path_param("id"));
        let err = build_request(&d, BASE, &[], &AppliedAuth::None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ArityMismatch {
                expected: 1,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn header_argument_must_be_a_string_map() {
        let d = descriptor(EndpointSpec::get("get", "/").header_map());
        let err = build_request(&d, BASE, &[json!("X-Trace")], &AppliedAuth::None).unwrap_err();
        assert!(matches!(err, ConfigError::HeaderArgumentNotMap { index: 0, .. }));

        let err =
            build_request(&d, BASE, &[json!({"X-Count": 3})], &AppliedAuth::None).unwrap_err();
        assert!(matches!(err, ConfigError::HeaderArgumentNotMap { index: 0, .. }));
    }

    #[test]
    fn null_header_entries_are_skipped() {
        let d = descriptor(EndpointSpec::get("get", "/").header_map());
        let request = build_request(
            &d,
            BASE,
            &[json!({"X-Trace": "t", "X-Tenant": null})],
            &AppliedAuth::None,
        )
        .unwrap();
        assert_eq!(
            header_pairs(&request),
            vec![("x-trace".to_owned(), "t".to_owned())]
        );
    }

    #[test]
    fn headers_are_ordered_static_then_call_then_auth() {
        let d = descriptor(
            EndpointSpec::get("get", "/")
                .header("Accept", "application/json")
                .header("X-Tag", "static")
                .header_map(),
        );
        let auth = authorization("Bearer t").unwrap();
        let request = build_request(&d, BASE, &[json!({"X-Tag": "call"})], &auth).unwrap();
        assert_eq!(
            header_pairs(&request),
            vec![
                ("accept".to_owned(), "application/json".to_owned()),
                ("x-tag".to_owned(), "static".to_owned()),
                ("x-tag".to_owned(), "call".to_owned()),
                ("authorization".to_owned(), "Bearer t".to_owned()),
            ]
        );
    }

    #[test]
    fn body_is_serialized_for_post_and_put_only() {
        let post = descriptor(EndpointSpec::post("create", "/users").body().body());
        let request = build_request(
            &post,
            BASE,
            &[json!({"name": "Ann"}), json!({"name": "Bob"})],
            &AppliedAuth::None,
        )
        .unwrap();
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "Ann"}));

        let http = request.into_http().unwrap();
        assert_eq!(http.headers()[CONTENT_TYPE], "application/json");

        let delete = descriptor(EndpointSpec::delete("remove", "/users").body());
        let request =
            build_request(&delete, BASE, &[json!({"name": "Ann"})], &AppliedAuth::None).unwrap();
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn basic_auth_header_format() {
        let auth = AuthDeclaration::Basic {
            username: "user".into(),
            password: SecretString::new("pass"),
        };
        let applied = materialize_auth(&auth, None).await.unwrap();
        match applied {
            AppliedAuth::Header(name, value) => {
                assert_eq!(name, AUTHORIZATION);
                assert_eq!(value, "Basic dXNlcjpwYXNz");
                assert!(value.is_sensitive());
            }
            other => panic!("unexpected auth: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bearer_and_header_api_key() {
        let bearer = AuthDeclaration::Bearer {
            token: SecretString::new("abc"),
        };
        assert!(matches!(
            materialize_auth(&bearer, None).await.unwrap(),
            AppliedAuth::Header(_, ref v) if v == "Bearer abc"
        ));

        let api_key = AuthDeclaration::ApiKey {
            name: "X-Api-Key".into(),
            value: SecretString::new("k1"),
            location: ApiKeyLocation::Header,
        };
        match materialize_auth(&api_key, None).await.unwrap() {
            AppliedAuth::Header(name, value) => {
                assert_eq!(name.as_str(), "x-api-key");
                assert_eq!(value, "k1");
            }
            other => panic!("unexpected auth: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_api_key_is_appended_after_query_parameters() {
        let api_key = AuthDeclaration::ApiKey {
            name: "api_key".into(),
            value: SecretString::new("k1"),
            location: ApiKeyLocation::Query,
        };
        let applied = materialize_auth(&api_key, None).await.unwrap();
        let d = descriptor(EndpointSpec::get("search", "/users").query_param("q"));
        let request = build_request(&d, BASE, &[json!("ann")], &applied).unwrap();
        assert_eq!(request.url.query(), Some("q=ann&api_key=k1"));
        assert!(!request.headers.iter().any(|(n, _)| n == AUTHORIZATION));
    }

    #[tokio::test]
    async fn oauth2_without_token_manager_is_a_token_error() {
        let credentials = crate::oauth2::OAuth2Credentials::new(
            "id",
            "secret",
            Url::parse("https://auth.example.com/token").unwrap(),
        );
        let err = materialize_auth(&AuthDeclaration::OAuth2(credentials), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Token(TokenError::Unavailable(_))));
    }

    #[test]
    fn base_and_path_are_joined_with_one_slash() {
        assert_eq!(join_url("https://a.com/v1/", "/users"), "https://a.com/v1/users");
        assert_eq!(join_url("https://a.com/v1", "users"), "https://a.com/v1/users");
        assert_eq!(join_url("https://a.com", ""), "https://a.com");
    }
}
