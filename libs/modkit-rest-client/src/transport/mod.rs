//! Shared HTTP transport: pooled hyper client behind a small tower stack.
//!
//! ```text
//! Timeout → FollowRedirect → hyper_util Client (rustls)
//! ```
//!
//! [`Transport::execute`] returns the response for every HTTP status; only
//! connection, TLS and timeout failures are errors. Status handling belongs to
//! the caller.

mod config;
mod tls;

pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, TlsRootConfig, TransportConfig, TransportSecurity,
};

use std::time::Duration;

use bytes::Bytes;
use http::header::USER_AGENT;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::timeout::{Timeout, TimeoutLayer};
use tower_http::follow_redirect::{FollowRedirect, FollowRedirectLayer};

use crate::error::TransportError;

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;
type TransportService = Timeout<FollowRedirect<HyperClient>>;

/// Connection pool, TLS context and timeouts shared by all calls of a client.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct Transport {
    service: TransportService,
    user_agent: HeaderValue,
    request_timeout: Duration,
    max_body_size: usize,
    security: TransportSecurity,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .field("max_body_size", &self.max_body_size)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Builds the transport. No runtime is required until the first request.
    ///
    /// # Errors
    /// Returns [`TransportError::Tls`] if the TLS roots cannot be loaded and
    /// [`TransportError::InvalidHeaderValue`] for an invalid user agent.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        if config.security == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let https = tls::build_connector(config)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        client_builder.pool_timer(TokioTimer::new());
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let client = client_builder.build::<_, Full<Bytes>>(https);

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(config.request_timeout))
            .layer(FollowRedirectLayer::new())
            .service(client);

        Ok(Self {
            service,
            user_agent: HeaderValue::from_str(&config.user_agent)?,
            request_timeout: config.request_timeout,
            max_body_size: config.max_body_size,
            security: config.security,
        })
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Sends one request and returns the response head with an unread body.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidScheme`] for a URL the security mode
    /// forbids, [`TransportError::Timeout`] when the request timeout elapses
    /// and [`TransportError::Connection`] for network failures.
    pub async fn execute(
        &self,
        mut request: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, TransportError> {
        self.check_scheme(request.uri())?;

        if !request.headers().contains_key(USER_AGENT) {
            request
                .headers_mut()
                .insert(USER_AGENT, self.user_agent.clone());
        }

        let timeout = self.request_timeout;
        self.service
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| map_tower_error(e, timeout))
    }

    /// Reads a response body to the end, enforcing `max_body_size`.
    ///
    /// Reading to the end hands the connection back to the pool; dropping the
    /// body early closes it.
    ///
    /// # Errors
    /// Returns [`TransportError::BodyTooLarge`] past the limit and
    /// [`TransportError::Connection`] if the stream fails.
    pub async fn read_body(&self, body: Incoming) -> Result<Bytes, TransportError> {
        read_body_limited(body, self.max_body_size).await
    }

    fn check_scheme(&self, uri: &http::Uri) -> Result<(), TransportError> {
        match uri.scheme_str() {
            Some("https") => Ok(()),
            Some("http") if self.security == TransportSecurity::AllowInsecureHttp => Ok(()),
            Some("http") => Err(TransportError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            other => Err(TransportError::InvalidScheme {
                scheme: other.unwrap_or_default().to_owned(),
                reason: "only http and https are supported".to_owned(),
            }),
        }
    }
}

async fn read_body_limited(body: Incoming, limit: usize) -> Result<Bytes, TransportError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(TransportError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

fn map_tower_error(err: tower::BoxError, timeout: Duration) -> TransportError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return TransportError::Timeout(timeout);
    }
    TransportError::Connection(err)
}
