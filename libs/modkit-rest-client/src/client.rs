//! The API client: built once from an [`ApiDefinition`], then shared.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use url::Url;

use crate::args::CallArgs;
use crate::auth::AuthDeclaration;
use crate::classify::classify;
use crate::config::{ApiClientConfig, EnvProperties, PropertySource, resolve_placeholders};
use crate::definition::ApiDefinition;
use crate::dispatch::{PendingCall, WorkerPool};
use crate::endpoint::EndpointDescriptor;
use crate::error::{ApiError, ConfigError};
use crate::interceptor::Interceptor;
use crate::oauth2::TokenManager;
use crate::request::{build_request, check_arity, materialize_auth};
use crate::transport::Transport;

/// Builder for [`ApiClient`].
///
/// ```ignore
/// let client = ApiClient::builder(definition)
///     .config(ApiClientConfig::from_figment(&figment, "clients.users")?)
///     .properties(figment)
///     .interceptor(LoggingInterceptor)
///     .build()?;
/// ```
pub struct ApiClientBuilder {
    definition: ApiDefinition,
    config: ApiClientConfig,
    properties: Box<dyn PropertySource>,
    token_manager: Option<Arc<TokenManager>>,
    transport: Option<Transport>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ApiClientBuilder {
    fn new(definition: ApiDefinition) -> Self {
        Self {
            definition,
            config: ApiClientConfig::default(),
            properties: Box::new(EnvProperties),
            token_manager: None,
            transport: None,
            interceptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ApiClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Source for `${name}` placeholders in the base URL. Defaults to the
    /// process environment.
    #[must_use]
    pub fn properties(mut self, properties: impl PropertySource + 'static) -> Self {
        self.properties = Box::new(properties);
        self
    }

    /// Token manager for `OAuth2` endpoints. Defaults to
    /// [`TokenManager::global`], which only talks to HTTPS token endpoints;
    /// inject a manager built on an insecure transport to use `http://` ones.
    #[must_use]
    pub fn token_manager(mut self, token_manager: Arc<TokenManager>) -> Self {
        self.token_manager = Some(token_manager);
        self
    }

    /// Uses an existing transport instead of building one from the config.
    #[must_use]
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Validates every endpoint and builds the client.
    ///
    /// # Errors
    /// Returns [`ApiError::Config`] for an invalid definition (duplicate
    /// endpoint, missing verb, missing auth parameters, invalid header, no or
    /// invalid base URL), [`ApiError::Transport`] if the transport cannot be
    /// built and [`ApiError::Token`] if the global token manager is needed but
    /// unavailable.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let name = self.definition.name.clone();

        let mut endpoints = HashMap::with_capacity(self.definition.endpoints.len());
        for spec in &self.definition.endpoints {
            if endpoints.contains_key(&spec.id) {
                return Err(ConfigError::DuplicateEndpoint(format!("{name}.{}", spec.id)).into());
            }
            let descriptor = EndpointDescriptor::from_spec(&name, spec, &self.definition.auth)?;
            endpoints.insert(spec.id.clone(), Arc::new(descriptor));
        }

        let base_url = self.resolve_base_url()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Transport::new(&self.config.transport)?,
        };

        if self.config.max_in_flight > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "max_in_flight {} exceeds {}",
                self.config.max_in_flight,
                Semaphore::MAX_PERMITS
            ))
            .into());
        }

        let tokens = match self.token_manager {
            Some(manager) => Some(manager),
            None => global_tokens_for(&endpoints)?,
        };

        tracing::info!(
            client = %name,
            base_url = %base_url,
            endpoints = endpoints.len(),
            max_in_flight = self.config.max_in_flight,
            "API client built"
        );

        Ok(ApiClient {
            inner: Arc::new(Inner {
                name,
                base_url,
                endpoints,
                transport: ArcSwapOption::from_pointee(transport),
                tokens,
                interceptors: self.interceptors,
                pool: WorkerPool::new(self.config.max_in_flight),
                shutdown_grace: self.config.shutdown_grace,
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// The definition's base URL wins over the configured one; placeholders
    /// are expanded after the choice.
    fn resolve_base_url(&self) -> Result<String, ConfigError> {
        let raw = if self.definition.base_url.trim().is_empty() {
            self.config.base_url.as_deref().unwrap_or_default()
        } else {
            self.definition.base_url.as_str()
        };
        let resolved = resolve_placeholders(raw, self.properties.as_ref());
        let resolved = resolved.trim();
        if resolved.is_empty() {
            return Err(ConfigError::MissingBaseUrl(self.definition.name.clone()));
        }
        Url::parse(resolved).map_err(|e| ConfigError::InvalidUrl {
            url: resolved.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(resolved.to_owned())
    }
}

/// The global manager if any endpoint uses `OAuth2`. Its transport is HTTPS
/// only, so plain `http://` token endpoints are rejected here.
fn global_tokens_for(
    endpoints: &HashMap<String, Arc<EndpointDescriptor>>,
) -> Result<Option<Arc<TokenManager>>, ApiError> {
    let mut credentials = endpoints
        .values()
        .filter_map(|descriptor| match descriptor.auth() {
            AuthDeclaration::OAuth2(credentials) => Some((descriptor, credentials)),
            _ => None,
        })
        .peekable();
    if credentials.peek().is_none() {
        return Ok(None);
    }
    if let Some((descriptor, insecure)) =
        credentials.find(|(_, c)| c.token_url().scheme() != "https")
    {
        return Err(ConfigError::Invalid(format!(
            "token URL '{}' of endpoint '{}' is not HTTPS; inject a token manager to use it",
            insecure.token_url(),
            descriptor.id()
        ))
        .into());
    }
    Ok(Some(TokenManager::global()?))
}

impl fmt::Debug for ApiClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClientBuilder")
            .field("definition", &self.definition.name)
            .field("config", &self.config)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

/// Typed client for one remote API.
///
/// Cloning is cheap; clones share the transport, worker pool and endpoint
/// table. All methods take `&self` and may be used from many tasks at once.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    base_url: String,
    endpoints: HashMap<String, Arc<EndpointDescriptor>>,
    transport: ArcSwapOption<Transport>,
    tokens: Option<Arc<TokenManager>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    pool: WorkerPool,
    shutdown_grace: std::time::Duration,
    shut_down: AtomicBool,
}

impl ApiClient {
    #[must_use]
    pub fn builder(definition: ApiDefinition) -> ApiClientBuilder {
        ApiClientBuilder::new(definition)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Base URL with placeholders already expanded.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    #[must_use]
    pub fn endpoint(&self, id: &str) -> Option<&EndpointDescriptor> {
        self.inner.endpoints.get(id).map(AsRef::as_ref)
    }

    /// Endpoint ids, sorted.
    #[must_use]
    pub fn endpoint_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.inner.endpoints.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Calls `endpoint` on the current task and returns the decoded body.
    ///
    /// `Ok(None)` means a success response with an empty body.
    ///
    /// # Errors
    /// Returns an [`ApiError`] describing the first failure: invalid
    /// arguments, token acquisition, transport, a non-success status or a
    /// body that does not decode.
    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        args: CallArgs,
    ) -> Result<Option<T>, ApiError> {
        if self.is_shut_down() {
            return Err(ApiError::ShutDown(self.inner.name.clone()));
        }
        self.inner.execute(endpoint, args).await
    }

    /// Calls `endpoint` on the client's worker pool.
    ///
    /// Must be called within a Tokio runtime. Failures, including a client
    /// that is already shut down, are reported by the returned future.
    pub fn submit<T>(&self, endpoint: &str, args: CallArgs) -> PendingCall<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if self.is_shut_down() {
            return PendingCall::failed(ApiError::ShutDown(self.inner.name.clone()));
        }
        let inner = Arc::clone(&self.inner);
        let endpoint = endpoint.to_owned();
        self.inner
            .pool
            .spawn(async move { inner.execute(&endpoint, args).await })
    }

    /// Stops accepting async calls, waits for in-flight ones up to the
    /// configured grace period, cancels the rest and releases the transport.
    ///
    /// Only the first invocation does anything.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(client = %self.inner.name, "shutting down API client");
        self.inner.pool.shutdown(self.inner.shutdown_grace).await;
        self.inner.transport.store(None);
        tracing::debug!(client = %self.inner.name, "API client shut down");
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiClient[{}]", self.inner.name)
    }
}

impl Inner {
    /// Calls accepted before shutdown run to completion while the transport
    /// is still held.
    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        args: CallArgs,
    ) -> Result<Option<T>, ApiError> {
        let descriptor = self
            .endpoints
            .get(endpoint)
            .ok_or_else(|| ConfigError::UnknownEndpoint(format!("{}.{endpoint}", self.name)))?;
        let args = args.into_values()?;
        check_arity(descriptor, args.len())?;

        let auth = materialize_auth(descriptor.auth(), self.tokens.as_deref()).await?;
        let mut request = build_request(descriptor, &self.base_url, &args, &auth)?;
        tracing::debug!(
            client = %self.name,
            endpoint,
            method = %request.method,
            path = request.url.path(),
            auth = %descriptor.auth().scheme(),
            "dispatching API request"
        );
        for interceptor in &self.interceptors {
            interceptor.before_request(descriptor, &mut request);
        }

        let transport = self
            .transport
            .load_full()
            .ok_or_else(|| ApiError::ShutDown(self.name.clone()))?;
        let response = transport.execute(request.into_http()?).await?;
        for interceptor in &self.interceptors {
            interceptor.after_response(descriptor, response.status());
        }

        classify(&transport, response, descriptor.response()).await
    }
}
