//! Token acquisition and caching.

use std::time::Duration;

use crate::error::TokenFetchError;

pub mod client_credentials;
pub mod clock;
pub mod token_manager;

#[cfg(any(test, feature = "test-util"))]
pub use self::clock::ManualClock;
pub use self::clock::{Clock, SystemClock};

#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    type Token: Token;

    async fn get_auth_token(&self) -> Result<Self::Token, TokenFetchError>;
}

pub trait Token: Send {
    fn access_token(&self) -> &str;
}

/// A token that is only valid for a limited time after it was issued.
pub trait ExpiringToken: Token {
    fn lifetime(&self) -> Duration;
}
