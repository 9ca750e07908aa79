use thiserror::Error;

/// Errors from the `OAuth2` token endpoint.
///
/// No variant ever carries the client secret or a token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// Transport failure while talking to the token endpoint.
    ///
    /// The message is prefixed with `OAuth2 token` and never contains secrets.
    #[error("{0}")]
    Http(String),

    /// The token endpoint answered with a non-2xx status.
    ///
    /// The response body is deliberately not kept.
    #[error("OAuth2 token HTTP {status}")]
    Status { status: http::StatusCode },

    /// The token endpoint returned an unparseable or incomplete response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The shared token transport could not be built.
    #[error("OAuth2 token transport unavailable: {0}")]
    Unavailable(String),
}
