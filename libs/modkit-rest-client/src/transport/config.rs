use std::time::Duration;

use serde::Deserialize;

use crate::config::duration;

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-rest-client/", env!("CARGO_PKG_VERSION"));

/// Default cap on a response body (10 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    #[serde(rename = "webpki")]
    WebPki,
    /// OS native root certificate store
    Native,
}

/// Whether plain `http://` URLs may be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportSecurity {
    /// HTTPS only
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (mock servers, local development)
    AllowInsecureHttp,
}

/// Connection settings for one [`Transport`](super::Transport).
///
/// Durations are humantime strings in configuration files (`"30s"`, `"1m"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// TCP connect timeout (default: 30 seconds)
    #[serde(deserialize_with = "duration::deserialize")]
    pub connect_timeout: Duration,

    /// Whole request timeout, from send until response headers (default: 30 seconds)
    #[serde(deserialize_with = "duration::deserialize")]
    pub request_timeout: Duration,

    pub user_agent: String,

    /// Maximum accepted response body size in bytes
    pub max_body_size: usize,

    /// Idle pooled connections are closed after this long (`None` keeps them)
    #[serde(deserialize_with = "duration::deserialize_option")]
    pub pool_idle_timeout: Option<Duration>,

    pub tls_roots: TlsRootConfig,

    pub security: TransportSecurity,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            tls_roots: TlsRootConfig::default(),
            security: TransportSecurity::default(),
        }
    }
}

impl TransportConfig {
    /// Configuration for tests against local mock servers.
    ///
    /// Plain HTTP is allowed and timeouts are short.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            security: TransportSecurity::AllowInsecureHttp,
            ..Self::default()
        }
    }
}
