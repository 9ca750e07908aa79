//! Hooks around every dispatched request.

use std::sync::Arc;

use http::StatusCode;

use crate::endpoint::EndpointDescriptor;
use crate::request::WireRequest;

/// Observes or adjusts requests and responses of an [`ApiClient`](crate::ApiClient).
///
/// Interceptors run in registration order, after authentication has been
/// applied. Both hooks default to no-ops.
pub trait Interceptor: Send + Sync {
    fn before_request(&self, _endpoint: &EndpointDescriptor, _request: &mut WireRequest) {}

    fn after_response(&self, _endpoint: &EndpointDescriptor, _status: StatusCode) {}
}

impl<T: Interceptor + ?Sized> Interceptor for Arc<T> {
    fn before_request(&self, endpoint: &EndpointDescriptor, request: &mut WireRequest) {
        (**self).before_request(endpoint, request);
    }

    fn after_response(&self, endpoint: &EndpointDescriptor, status: StatusCode) {
        (**self).after_response(endpoint, status);
    }
}

/// Logs each request and response status at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn before_request(&self, endpoint: &EndpointDescriptor, request: &mut WireRequest) {
        tracing::debug!(
            endpoint = endpoint.id(),
            method = %request.method,
            url = %request.url.path(),
            has_body = request.body.is_some(),
            "sending request"
        );
    }

    fn after_response(&self, endpoint: &EndpointDescriptor, status: StatusCode) {
        tracing::debug!(endpoint = endpoint.id(), status = status.as_u16(), "received response");
    }
}
