//! Client configuration and `${property}` placeholder expansion.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::LazyLock;
use std::time::Duration;

use figment::Figment;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::transport::TransportConfig;

/// Default number of concurrently running async calls per client
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// Default time `shutdown` waits for in-flight async calls
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]+)\}").expect("static regex should not panic")
});

/// Per-client settings.
///
/// ```yaml
/// clients:
///   users:
///     base_url: "${users.host}/v1"
///     max_in_flight: 10
///     shutdown_grace: 5s
///     transport:
///       connect_timeout: 30s
///       request_timeout: 30s
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiClientConfig {
    /// Used when the API definition carries no base URL of its own.
    pub base_url: Option<String>,
    pub transport: TransportConfig,
    /// Worker pool size for [`ApiClient::submit`](crate::ApiClient::submit)
    pub max_in_flight: usize,
    #[serde(deserialize_with = "duration::deserialize")]
    pub shutdown_grace: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            transport: TransportConfig::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ApiClientConfig {
    /// Extracts the config at `section` (a dotted path). A missing section
    /// yields the defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the section exists but does not
    /// deserialize.
    pub fn from_figment(figment: &Figment, section: &str) -> Result<Self, ConfigError> {
        if figment.find_value(section).is_err() {
            return Ok(Self::default());
        }
        figment
            .extract_inner(section)
            .map_err(|e| ConfigError::Invalid(format!("{section}: {e}")))
    }
}

/// Key-value lookup used to expand `${name}` placeholders.
pub trait PropertySource: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
}

impl<S: BuildHasher + Send + Sync> PropertySource for HashMap<String, String, S> {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Reads properties from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProperties;

impl PropertySource for EnvProperties {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Dotted keys are figment paths (`users.host` reads `users: { host: ... }`).
impl PropertySource for Figment {
    fn property(&self, key: &str) -> Option<String> {
        self.extract_inner::<String>(key)
            .ok()
            .or_else(|| self.extract_inner::<i64>(key).ok().map(|v| v.to_string()))
            .or_else(|| self.extract_inner::<bool>(key).ok().map(|v| v.to_string()))
    }
}

/// Replaces every `${name}` in `input` with the property value.
///
/// Unknown properties become the empty string.
pub fn resolve_placeholders(input: &str, properties: &dyn PropertySource) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            let key = caps[1].trim();
            properties.property(key).unwrap_or_else(|| {
                tracing::warn!(property = key, "unresolved placeholder replaced with empty string");
                String::new()
            })
        })
        .into_owned()
}

/// Humantime (`"30s"`, `"1m 30s"`) deserializers.
pub(crate) mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de};

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }

    pub(crate) fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| humantime::parse_duration(&raw).map_err(de::Error::custom))
            .transpose()
    }
}
