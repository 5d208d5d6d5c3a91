//! OAuth2 client-credentials client.
//!
//! Obtains bearer tokens from a token endpoint, caches them until shortly
//! before they expire, and attaches them to every call made to a downstream
//! API. [`ApiClient`] is the async client; [`blocking::ApiClient`] runs the
//! same client to completion on the calling thread.
//!
//! ```no_run
//! use oauth2_api_client::{new_api_client_async, OAuth2Config};
//! use reqwest::Method;
//!
//! # async fn run() -> Result<(), oauth2_api_client::Error> {
//! let config = OAuth2Config::new(
//!     "https://auth.example.com/oauth/token",
//!     "my-client",
//!     "my-secret",
//!     ["read"],
//! )?;
//! let client = new_api_client_async(config, "https://api.example.com")?;
//! let (body, status) = client.call_api(Method::GET, "/users", None, None).await?.into_parts();
//! println!("{status}: {body:?}");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod blocking;
pub mod config;
pub mod error;

pub use crate::{
    api::{ApiClient, ApiResponse, Download, RequestBody, ResponseBody},
    config::{ClientAuthMethod, OAuth2Config},
    error::{ApiCallError, ConfigurationError, Error, TokenFetchError},
};

/// Blocking client for `base_url`, authenticated with `config`.
///
/// The transport is released when the client is dropped or closed.
pub fn new_api_client(
    config: OAuth2Config,
    base_url: impl Into<String>,
) -> Result<blocking::ApiClient, Error> {
    blocking::ApiClient::new(config, base_url)
}

/// Async client for `base_url`, authenticated with `config`.
///
/// The transport is released when the client is dropped or closed.
pub fn new_api_client_async(
    config: OAuth2Config,
    base_url: impl Into<String>,
) -> Result<ApiClient, Error> {
    ApiClient::new(config, base_url)
}
