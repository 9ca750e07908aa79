use aliri_clock::UnixTime;
use serde::Deserialize;

use super::error::TokenError;
use crate::secret::SecretString;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Tokens are treated as expired this long before the server-declared expiry.
pub const EXPIRY_SKEW_SECS: u64 = 60;

/// Token endpoint response body.
///
/// Every field is optional here so that a missing `access_token` is reported
/// as an invalid response rather than a JSON error.
#[derive(Deserialize)]
pub(super) struct TokenResponse {
    #[serde(default)]
    access_token: Option<SecretString>,
    #[serde(default)]
    refresh_token: Option<SecretString>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// A cached access token.
///
/// Replaced wholesale on refresh; `access_token` is never empty.
#[derive(Clone)]
pub struct TokenData {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: UnixTime,
}

impl TokenData {
    pub(super) fn from_response(response: TokenResponse, now: UnixTime) -> Result<Self, TokenError> {
        let access_token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| TokenError::InvalidResponse("missing or empty access_token".into()))?;

        let expires_in = match response.expires_in {
            None | Some(serde_json::Value::Null) => DEFAULT_EXPIRES_IN_SECS,
            Some(serde_json::Value::Number(n)) => n.as_u64().ok_or_else(|| {
                TokenError::InvalidResponse(format!("expires_in is not a positive integer: {n}"))
            })?,
            // Some providers send the lifetime as a string.
            Some(serde_json::Value::String(s)) => s.trim().parse().map_err(|_| {
                TokenError::InvalidResponse(format!("expires_in is not an integer: {s}"))
            })?,
            Some(other) => {
                return Err(TokenError::InvalidResponse(format!(
                    "unexpected expires_in value: {other}"
                )));
            }
        };

        Ok(Self {
            access_token,
            refresh_token: response.refresh_token.filter(|token| !token.is_empty()),
            expires_at: UnixTime(
                now.0
                    .saturating_add(expires_in.saturating_sub(EXPIRY_SKEW_SECS)),
            ),
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    #[must_use]
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self, now: UnixTime) -> bool {
        now.0 >= self.expires_at.0
    }
}

impl std::fmt::Debug for TokenData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenData")
            .field("access_token", &self.access_token)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at.0)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<TokenData, TokenError> {
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        TokenData::from_response(response, UnixTime(1_000))
    }

    #[test]
    fn expiry_subtracts_safety_buffer() {
        let token = parse(r#"{"access_token":"tok","expires_in":120}"#).unwrap();
        assert_eq!(token.expires_at().0, 1_060);
        assert!(!token.is_expired(UnixTime(1_059)));
        assert!(token.is_expired(UnixTime(1_060)));
    }

    #[test]
    fn missing_expires_in_defaults_to_an_hour() {
        let token = parse(r#"{"access_token":"tok"}"#).unwrap();
        assert_eq!(token.expires_at().0, 1_000 + 3_600 - 60);
        assert!(token.refresh_token().is_none());
    }

    #[test]
    fn string_expires_in_is_accepted() {
        let token = parse(r#"{"access_token":"tok","expires_in":"300"}"#).unwrap();
        assert_eq!(token.expires_at().0, 1_240);
    }

    #[test]
    fn huge_expires_in_saturates() {
        let token = parse(r#"{"access_token":"tok","expires_in":18446744073709551615}"#).unwrap();
        assert_eq!(token.expires_at().0, u64::MAX);
        assert!(!token.is_expired(UnixTime(1_700_000_000)));
    }

    #[test]
    fn short_lifetime_never_precedes_now() {
        let token = parse(r#"{"access_token":"tok","expires_in":30}"#).unwrap();
        assert_eq!(token.expires_at().0, 1_000);
    }

    #[test]
    fn refresh_token_is_kept() {
        let token = parse(r#"{"access_token":"tok","refresh_token":"ref"}"#).unwrap();
        assert_eq!(token.refresh_token().map(SecretString::expose), Some("ref"));
    }

    #[test]
    fn empty_or_missing_access_token_is_rejected() {
        assert!(matches!(
            parse(r#"{"access_token":""}"#),
            Err(TokenError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse(r#"{"token_type":"Bearer"}"#),
            Err(TokenError::InvalidResponse(_))
        ));
    }

    #[test]
    fn debug_hides_token() {
        let token = parse(r#"{"access_token":"very-secret-token"}"#).unwrap();
        assert!(!format!("{token:?}").contains("very-secret-token"));
    }
}
