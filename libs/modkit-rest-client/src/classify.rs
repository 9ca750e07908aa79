//! Response classification: a raw response becomes `Option<T>` or a typed
//! [`ApiError`].

use http::Response;
use http::header::CONTENT_TYPE;
use hyper::body::Incoming;
use mime::Mime;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::endpoint::ResponseKind;
use crate::error::{ApiError, ProcessingKind, StatusKind, UNKNOWN_ERROR_CODE};
use crate::transport::Transport;

/// Reads the whole body and classifies the response.
///
/// The body is always consumed or dropped before this returns, so the
/// connection goes back to the pool or is closed on every path.
pub(crate) async fn classify<T: DeserializeOwned>(
    transport: &Transport,
    response: Response<Incoming>,
    kind: ResponseKind,
) -> Result<Option<T>, ApiError> {
    let (parts, body) = response.into_parts();
    let status = parts.status.as_u16();
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let bytes = transport
        .read_body(body)
        .await
        .map_err(|e| ApiError::Processing {
            kind: ProcessingKind::Other,
            status,
            body: None,
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;

    classify_parts(status, content_type, &bytes, kind)
}

/// Classifies an already read response.
pub(crate) fn classify_parts<T: DeserializeOwned>(
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
    kind: ResponseKind,
) -> Result<Option<T>, ApiError> {
    let mime = content_type.and_then(|ct| ct.parse::<Mime>().ok());
    let text = decode_text(body, mime.as_ref());

    if !(200..300).contains(&status) {
        return Err(status_error(status, text));
    }

    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };

    match kind {
        ResponseKind::Text => serde_json::from_value(Value::String(text.clone()))
            .map(Some)
            .map_err(|e| {
                processing(
                    ProcessingKind::Other,
                    status,
                    text,
                    "text response does not fit the declared type",
                    e,
                )
            }),
        ResponseKind::Json => {
            let is_json = mime
                .as_ref()
                .is_some_and(|m| m.essence_str().eq_ignore_ascii_case("application/json"));
            if !is_json {
                return Err(ApiError::Processing {
                    kind: ProcessingKind::InvalidContentType,
                    status,
                    message: format!(
                        "expected application/json response, got {}",
                        content_type.unwrap_or("no content type")
                    ),
                    body: Some(text),
                    source: None,
                });
            }
            serde_json::from_str(&text).map(Some).map_err(|e| {
                processing(
                    ProcessingKind::JsonParse,
                    status,
                    text,
                    "failed to parse JSON response",
                    e,
                )
            })
        }
    }
}

fn processing(
    kind: ProcessingKind,
    status: u16,
    body: String,
    message: &str,
    source: serde_json::Error,
) -> ApiError {
    ApiError::Processing {
        kind,
        status,
        body: Some(body),
        message: format!("{message}: {source}"),
        source: Some(Box::new(source)),
    }
}

fn status_error(status: u16, body: Option<String>) -> ApiError {
    let kind = StatusKind::from_status(status);
    let error_code = extract_error_code(body.as_deref());
    tracing::debug!(status, error_code = %error_code, "API request failed");
    ApiError::Status {
        kind,
        status,
        body,
        error_code,
        message: format!(
            "API request failed with status {status}: {}",
            kind.default_message()
        ),
    }
}

/// Best-effort error code from a JSON error body.
///
/// Tries `code`, `errorCode`, `error.code` and then `error` itself, falling
/// back to [`UNKNOWN_ERROR_CODE`]. Never fails.
pub(crate) fn extract_error_code(body: Option<&str>) -> String {
    let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
        return UNKNOWN_ERROR_CODE.to_owned();
    };
    let Ok(Value::Object(root)) = serde_json::from_str::<Value>(body) else {
        return UNKNOWN_ERROR_CODE.to_owned();
    };

    if let Some(code) = root.get("code").or_else(|| root.get("errorCode")) {
        return as_text(code);
    }
    if let Some(error) = root.get("error") {
        return as_text(error.get("code").unwrap_or(error));
    }
    UNKNOWN_ERROR_CODE.to_owned()
}

/// Scalars render as their text; containers render as the empty string.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_owned(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Decodes with the `charset` parameter, defaulting to UTF-8. An empty body
/// yields `None`.
fn decode_text(body: &[u8], content_type: Option<&Mime>) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let charset = content_type
        .and_then(|m| m.get_param(mime::CHARSET))
        .map(|cs| cs.as_str().to_ascii_lowercase());
    let text = match charset.as_deref() {
        Some("iso-8859-1" | "latin1") => body.iter().map(|&b| char::from(b)).collect(),
        Some("us-ascii") => body
            .iter()
            .map(|&b| {
                if b.is_ascii() {
                    char::from(b)
                } else {
                    char::REPLACEMENT_CHARACTER
                }
            })
            .collect(),
        None | Some("utf-8" | "utf8") => String::from_utf8_lossy(body).into_owned(),
        Some(other) => {
            tracing::debug!(charset = other, "unsupported charset, decoding as UTF-8");
            String::from_utf8_lossy(body).into_owned()
        }
    };
    Some(text)
}
