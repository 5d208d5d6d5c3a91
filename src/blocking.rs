//! Blocking counterparts of [`crate::ApiClient`] and
//! [`TokenManager`](crate::auth::token_manager::TokenManager).
//!
//! Each adapter drives the async implementation to completion on the calling
//! thread, using a current-thread tokio runtime. A client built with
//! [`ApiClient::with_token_manager`] shares the manager's runtime, so pooled
//! token-endpoint connections are always driven by the runtime that opened
//! them. The adapters must not be used from within an async context; use the
//! async types there.

use std::{path::Path, sync::Arc};

use reqwest::{header::HeaderMap, Method};
use tokio::runtime::{Builder, Runtime};

use crate::{
    api::{self, ApiResponse, Download, RequestBody},
    auth::{
        client_credentials::ClientCredentials,
        token_manager::{self, Record},
        Clock, ExpiringToken, SystemClock, TokenProvider,
    },
    config::OAuth2Config,
    error::{Error, TokenFetchError},
};

fn runtime() -> Result<Arc<Runtime>, Error> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(Arc::new(runtime))
}

/// Blocking API client. See [`crate::ApiClient`] for the call semantics.
pub struct ApiClient<AuthTokenProvider = token_manager::TokenManager<ClientCredentials>> {
    // Dropped before the runtime it was created in.
    inner: api::ApiClient<AuthTokenProvider>,
    runtime: Arc<Runtime>,
}

impl ApiClient {
    pub fn new(config: OAuth2Config, base_url: impl Into<String>) -> Result<Self, Error> {
        Self::from_async(|| api::ApiClient::new(config, base_url))
    }

    pub fn with_http_client(
        config: OAuth2Config,
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Result<Self, Error> {
        Self::from_async(|| api::ApiClient::with_http_client(config, base_url, client))
    }

    pub fn unauthenticated(base_url: impl Into<String>) -> Result<Self, Error> {
        Self::from_async(|| api::ApiClient::unauthenticated(base_url))
    }
}

impl<Provider, C> ApiClient<token_manager::TokenManager<Provider, C>>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: ExpiringToken,
    C: Clock,
{
    /// Client whose calls carry tokens from `manager`. Both share the cache
    /// and the runtime.
    pub fn with_token_manager(
        base_url: impl Into<String>,
        client: reqwest::Client,
        manager: &TokenManager<Provider, C>,
    ) -> Result<Self, Error> {
        let runtime = Arc::clone(&manager.runtime);
        let inner = {
            let _guard = runtime.enter();
            api::ApiClient::with_token_provider(base_url, client, Arc::clone(&manager.inner))?
        };
        Ok(Self { inner, runtime })
    }
}

impl<AuthTokenProvider> ApiClient<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
{
    /// The provider is driven on this client's own runtime. To share a
    /// [`TokenManager`] between blocking clients use
    /// [`ApiClient::with_token_manager`].
    pub fn with_token_provider(
        base_url: impl Into<String>,
        client: reqwest::Client,
        auth_token_provider: Arc<AuthTokenProvider>,
    ) -> Result<Self, Error> {
        Self::from_async(|| {
            api::ApiClient::with_token_provider(base_url, client, auth_token_provider)
        })
    }

    fn from_async<F>(build: F) -> Result<Self, Error>
    where
        F: FnOnce() -> Result<api::ApiClient<AuthTokenProvider>, Error>,
    {
        let runtime = runtime()?;
        let inner = {
            let _guard = runtime.enter();
            build()?
        };
        Ok(Self { inner, runtime })
    }

    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    pub fn token_provider(&self) -> Option<Arc<AuthTokenProvider>> {
        self.inner.token_provider()
    }

    pub fn access_token(&self) -> Result<Option<String>, Error> {
        self.runtime.block_on(self.inner.access_token())
    }

    pub fn call_api(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Result<ApiResponse, Error> {
        self.runtime
            .block_on(self.inner.call_api(method, path, headers, body))
    }

    pub fn download_file(
        &self,
        method: Method,
        path: &str,
        destination: impl AsRef<Path>,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Result<Download, Error> {
        self.runtime.block_on(
            self.inner
                .download_file(method, path, destination, headers, body),
        )
    }

    pub fn close(&self) -> bool {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Blocking token manager. Hand it to [`ApiClient::with_token_manager`] to
/// authenticate blocking calls with its cache.
pub struct TokenManager<Provider, C = SystemClock>
where
    Provider: TokenProvider,
{
    inner: Arc<token_manager::TokenManager<Provider, C>>,
    runtime: Arc<Runtime>,
}

impl TokenManager<ClientCredentials> {
    pub fn from_config(config: OAuth2Config) -> Result<Self, Error> {
        Self::new(|| {
            token_manager::TokenManager::from_config(reqwest::Client::new(), Arc::new(config))
        })
    }
}

impl<Provider, C> TokenManager<Provider, C>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: ExpiringToken,
    C: Clock,
{
    /// Wraps a manager built by `build`, which runs inside the new runtime so
    /// any transport it creates belongs to it.
    pub fn new<F>(build: F) -> Result<Self, Error>
    where
        F: FnOnce() -> token_manager::TokenManager<Provider, C>,
    {
        let runtime = runtime()?;
        let inner = {
            let _guard = runtime.enter();
            build()
        };
        Ok(Self {
            inner: Arc::new(inner),
            runtime,
        })
    }

    pub fn get_token(&self) -> Result<Record, TokenFetchError> {
        self.runtime.block_on(self.inner.get_token())
    }

    pub fn refresh(&self) -> Result<Record, TokenFetchError> {
        self.runtime.block_on(self.inner.refresh())
    }

    pub fn invalidate(&self) {
        self.runtime.block_on(self.inner.invalidate())
    }

    pub fn cached(&self) -> Option<Record> {
        self.runtime.block_on(self.inner.cached())
    }
}
