#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Typed REST API clients for `ModKit`
//!
//! A remote HTTP API is described once as an [`ApiDefinition`]: a named set of
//! endpoints, each with a verb, a path template, positional parameter bindings,
//! static headers and an authentication scheme. [`ApiClient::builder`] validates
//! the definition eagerly and produces a client that:
//! - Substitutes path placeholders and accumulates query parameters
//! - Serializes the first body-bound argument as JSON
//! - Applies Basic, API key, Bearer or `OAuth2` credentials
//! - Caches and refreshes `OAuth2` access tokens process-wide
//! - Classifies responses into typed values or typed [`ApiError`]s
//! - Runs calls inline ([`ApiClient::call`]) or on a bounded worker pool
//!   ([`ApiClient::submit`])
//!
//! # Example
//!
//! ```ignore
//! use modkit_rest_client::{ApiClient, ApiDefinition, AuthScheme, CallArgs, EndpointSpec};
//!
//! let definition = ApiDefinition::new("UserApi")
//!     .base_url("${users.url}/v1")
//!     .authenticated(AuthScheme::OAuth2)
//!     .oauth2("client-id", "client-secret", "https://idp.example.com/token")
//!     .endpoint(EndpointSpec::get("get_user", "/users/{id}").path_param("id"));
//!
//! let client = ApiClient::builder(definition).properties(props).build()?;
//!
//! let user: Option<User> = client.call("get_user", CallArgs::new().arg(&42)).await?;
//! ```

pub mod args;
pub mod auth;
mod classify;
pub mod client;
pub mod config;
pub mod definition;
mod dispatch;
pub mod endpoint;
pub mod error;
pub mod interceptor;
pub mod oauth2;
pub mod registry;
mod request;
pub mod secret;
pub mod transport;

pub use args::CallArgs;
pub use auth::{ApiKeyLocation, AuthAnnotations, AuthDeclaration, AuthScheme};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::{ApiClientConfig, EnvProperties, PropertySource, resolve_placeholders};
pub use definition::ApiDefinition;
pub use dispatch::PendingCall;
pub use endpoint::{EndpointDescriptor, EndpointSpec, HttpVerb, ParamBinding, ResponseKind};
pub use error::{ApiError, ConfigError, ErrorCategory, ProcessingKind, StatusKind, TransportError};
pub use interceptor::{Interceptor, LoggingInterceptor};
pub use oauth2::{OAuth2Credentials, TokenError, TokenManager};
pub use registry::ClientRegistry;
pub use request::{AppliedAuth, WireRequest};
pub use secret::SecretString;
pub use transport::{TlsRootConfig, Transport, TransportConfig, TransportSecurity};
