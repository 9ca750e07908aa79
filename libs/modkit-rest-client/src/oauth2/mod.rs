//! `OAuth2` access tokens for outbound calls.
//!
//! [`TokenManager`] caches one token per `client_id@token_url`, refreshes it
//! when it expires and serializes all token requests behind a single lock.

mod credentials;
mod error;
mod manager;
mod types;

pub use credentials::OAuth2Credentials;
pub use error::TokenError;
pub use manager::TokenManager;
pub use types::TokenData;
