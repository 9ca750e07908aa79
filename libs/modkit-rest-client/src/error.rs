use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthScheme;
use crate::oauth2::TokenError;

/// Sentinel error code used when a response body carries no recognizable code.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Invalid API definitions, configuration or call arguments.
///
/// These are never retried: they indicate a programming or deployment error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("endpoint '{endpoint}' declares no HTTP verb")]
    MissingVerb { endpoint: String },

    #[error("endpoint '{0}' is declared more than once")]
    DuplicateEndpoint(String),

    #[error("{scheme} authentication selected for '{scope}' but no {scheme} parameters are declared")]
    MissingAuthParameters { scope: String, scheme: AuthScheme },

    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("endpoint '{endpoint}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        endpoint: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} of endpoint '{endpoint}' must be a map of header names to values")]
    HeaderArgumentNotMap { endpoint: String, index: usize },

    #[error("path argument '{name}' of endpoint '{endpoint}' is null")]
    NullPathArgument { endpoint: String, name: String },

    #[error("failed to encode call argument {index}: {source}")]
    ArgumentEncode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("no base URL configured for API '{0}'")]
    MissingBaseUrl(String),

    /// The `reason` is diagnostic text only; do not match on it.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("API client '{0}' is already registered")]
    DuplicateClient(String),

    #[error("invalid client configuration: {0}")]
    Invalid(String),
}

/// Failures below HTTP semantics: connecting, TLS, timeouts, body transfer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    #[error("form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl From<hyper::Error> for TransportError {
    fn from(err: hyper::Error) -> Self {
        TransportError::Connection(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for TransportError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        TransportError::Connection(Box::new(err))
    }
}

/// Closed set of HTTP status error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
    /// Any other 4xx.
    ClientError,
    /// Any other 5xx.
    ServerError,
    /// A status that is neither success nor 4xx/5xx (1xx, 3xx).
    Unexpected,
}

impl StatusKind {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::TooManyRequests,
            500 => Self::InternalServerError,
            503 => Self::ServiceUnavailable,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Unexpected,
        }
    }

    /// Human readable default message for the kind.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::Conflict => "Conflict",
            Self::TooManyRequests => "Too Many Requests",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::ClientError | Self::ServerError | Self::Unexpected => "HTTP Error",
        }
    }
}

/// What went wrong while turning a successful response into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingKind {
    InvalidContentType,
    JsonParse,
    Other,
}

impl ProcessingKind {
    #[must_use]
    pub fn error_code(self) -> &'static str {
        match self {
            Self::InvalidContentType => "INVALID_CONTENT_TYPE",
            Self::JsonParse => "JSON_PARSE_ERROR",
            Self::Other => "PROCESSING_ERROR",
        }
    }
}

/// Coarse classification of an [`ApiError`] for callers that branch on category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Config,
    Transport,
    Token,
    Status,
    Processing,
    ShutDown,
    Cancelled,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Transport => "transport",
            Self::Token => "token",
            Self::Status => "status",
            Self::Processing => "processing",
            Self::ShutDown => "shut_down",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Error returned by every API client call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Token(#[from] TokenError),

    /// Non-success HTTP status.
    #[error("{message}")]
    Status {
        kind: StatusKind,
        status: u16,
        body: Option<String>,
        error_code: String,
        message: String,
    },

    /// A success response that could not be turned into the declared type.
    #[error("{message}")]
    Processing {
        kind: ProcessingKind,
        status: u16,
        body: Option<String>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("API client '{0}' has been shut down")]
    ShutDown(String),

    #[error("call was cancelled before completion")]
    Cancelled,
}

impl ApiError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Token(_) => ErrorCategory::Token,
            Self::Status { .. } => ErrorCategory::Status,
            Self::Processing { .. } => ErrorCategory::Processing,
            Self::ShutDown(_) => ErrorCategory::ShutDown,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// HTTP status of the response that caused the error, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Processing { status, .. } => Some(*status),
            Self::Token(TokenError::Status { status }) => Some(status.as_u16()),
            _ => None,
        }
    }

    /// Raw response body, if it was read.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } | Self::Processing { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    /// Machine-readable error code for status and processing errors.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Status { error_code, .. } => Some(error_code),
            Self::Processing { kind, .. } => Some(kind.error_code()),
            _ => None,
        }
    }

    #[must_use]
    pub fn status_kind(&self) -> Option<StatusKind> {
        match self {
            Self::Status { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
