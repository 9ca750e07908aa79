use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use aliri_clock::{Clock, System};
use bytes::Bytes;
use http::Request;
use http::header::{ACCEPT, CONTENT_TYPE};
use http_body_util::Full;
use tokio::sync::Mutex;

use super::credentials::OAuth2Credentials;
use super::error::TokenError;
use super::types::{TokenData, TokenResponse};
use crate::error::TransportError;
use crate::secret::SecretString;
use crate::transport::{Transport, TransportConfig};

static GLOBAL: OnceLock<Arc<TokenManager>> = OnceLock::new();

/// Process-wide `OAuth2` token cache.
///
/// Entries are keyed by `client_id@token_url`. One mutex guards the whole
/// cache and is held for the duration of a token request, so at most one
/// token request is in flight per manager and concurrent callers for the same
/// key reuse the token the first caller fetched.
pub struct TokenManager {
    transport: Transport,
    clock: Arc<dyn Clock + Send + Sync>,
    cache: Mutex<HashMap<String, TokenData>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self::with_clock(transport, System)
    }

    pub fn with_clock(transport: Transport, clock: impl Clock + Send + Sync + 'static) -> Self {
        Self {
            transport,
            clock: Arc::new(clock),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The shared manager used by clients that were not given one.
    ///
    /// Built on first use with the default (HTTPS only) transport.
    ///
    /// # Errors
    /// Returns [`TokenError::Unavailable`] if the transport cannot be built.
    pub fn global() -> Result<Arc<Self>, TokenError> {
        if let Some(manager) = GLOBAL.get() {
            return Ok(Arc::clone(manager));
        }
        let transport = Transport::new(&TransportConfig::default())
            .map_err(|e| TokenError::Unavailable(e.to_string()))?;
        Ok(Arc::clone(
            GLOBAL.get_or_init(|| Arc::new(Self::new(transport))),
        ))
    }

    /// Returns a valid access token, requesting or refreshing it if needed.
    ///
    /// # Errors
    /// Returns [`TokenError`] if the token endpoint cannot be reached, answers
    /// with a non-2xx status or returns no usable token. The cached entry is
    /// left as it was.
    pub async fn get_token(
        &self,
        credentials: &OAuth2Credentials,
    ) -> Result<SecretString, TokenError> {
        let key = credentials.cache_key();
        let mut cache = self.cache.lock().await;

        let previous = cache.get(&key);
        if let Some(entry) = previous
            && !entry.is_expired(self.clock.now())
        {
            return Ok(entry.access_token().clone());
        }

        let refresh_token = previous.and_then(TokenData::refresh_token).cloned();
        let fresh = self
            .request_token(credentials, refresh_token.as_ref())
            .await?;
        let access_token = fresh.access_token().clone();
        cache.insert(key, fresh);
        Ok(access_token)
    }

    async fn request_token(
        &self,
        credentials: &OAuth2Credentials,
        refresh_token: Option<&SecretString>,
    ) -> Result<TokenData, TokenError> {
        let mut fields: Vec<(&str, &str)> = vec![
            ("client_id", credentials.client_id()),
            ("client_secret", credentials.client_secret().expose()),
        ];
        let grant_type = match refresh_token {
            Some(token) => {
                fields.push(("grant_type", "refresh_token"));
                fields.push(("refresh_token", token.expose()));
                "refresh_token"
            }
            None => {
                fields.push(("grant_type", "client_credentials"));
                "client_credentials"
            }
        };

        tracing::debug!(
            client_id = credentials.client_id(),
            token_url = %credentials.token_url(),
            grant_type,
            "requesting OAuth2 token"
        );

        let form = serde_urlencoded::to_string(&fields)
            .map_err(|e| token_http_error(&TransportError::FormEncode(e)))?;
        let request = Request::post(credentials.token_url().as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(Full::new(Bytes::from(form)))
            .map_err(|e| token_http_error(&TransportError::RequestBuild(e)))?;

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| token_http_error(&e))?;
        let status = response.status();
        let body = self
            .transport
            .read_body(response.into_body())
            .await
            .map_err(|e| token_http_error(&e))?;

        if !status.is_success() {
            tracing::warn!(
                client_id = credentials.client_id(),
                status = status.as_u16(),
                "OAuth2 token request rejected"
            );
            return Err(TokenError::Status { status });
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| TokenError::InvalidResponse(format!("JSON parse failed: {e}")))?;
        TokenData::from_response(parsed, self.clock.now())
    }
}

/// Describes a transport failure without echoing bodies or credentials.
fn token_http_error(e: &TransportError) -> TokenError {
    const PREFIX: &str = "OAuth2 token";
    let message = match e {
        TransportError::Timeout(duration) => format!("{PREFIX} request timed out after {duration:?}"),
        TransportError::Connection(err) => format!("{PREFIX} transport error: {err}"),
        TransportError::Tls(err) => format!("{PREFIX} TLS error: {err}"),
        TransportError::BodyTooLarge { limit, actual } => {
            format!("{PREFIX} response too large: limit {limit} bytes, got {actual} bytes")
        }
        TransportError::RequestBuild(err) => format!("{PREFIX} request build failed: {err}"),
        TransportError::InvalidHeaderValue(err) => format!("{PREFIX} invalid header value: {err}"),
        TransportError::FormEncode(err) => format!("{PREFIX} form encode error: {err}"),
        TransportError::InvalidScheme { scheme, reason } => {
            format!("{PREFIX} invalid scheme '{scheme}': {reason}")
        }
    };
    TokenError::Http(message)
}
