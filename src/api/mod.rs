//! Authenticated calls to the downstream API.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method, StatusCode,
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{
    auth::{
        client_credentials::ClientCredentials, token_manager::TokenManager, Token, TokenProvider,
    },
    config::{validate_url, OAuth2Config},
    error::{ApiCallError, Error},
};

pub mod body;

pub use self::body::{ApiResponse, RequestBody, ResponseBody};

/// Outcome of [`ApiClient::download_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub status: StatusCode,
    pub bytes_written: u64,
    pub path: PathBuf,
}

/// Calls `base_url + path` with a bearer token from `AuthTokenProvider`.
///
/// Cloning the underlying transport is cheap, so one client can serve many
/// concurrent calls. The transport and the token provider are released by
/// [`ApiClient::close`] or when the client is dropped; calls made after
/// closing fail with [`ApiCallError::Closed`].
pub struct ApiClient<AuthTokenProvider = TokenManager<ClientCredentials>> {
    base_url: String,
    state: Mutex<Option<Connection<AuthTokenProvider>>>,
}

/// What a call needs, taken as a whole by [`ApiClient::close`].
struct Connection<AuthTokenProvider> {
    client: reqwest::Client,
    auth_token_provider: Option<Arc<AuthTokenProvider>>,
}

impl<AuthTokenProvider> Clone for Connection<AuthTokenProvider> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            auth_token_provider: self.auth_token_provider.clone(),
        }
    }
}

impl ApiClient {
    /// Client running the client-credentials flow described by `config`.
    pub fn new(config: OAuth2Config, base_url: impl Into<String>) -> Result<Self, Error> {
        Self::with_http_client(config, base_url, reqwest::Client::new())
    }

    /// Like [`ApiClient::new`] with a caller-built transport, shared by the
    /// token requests and the API calls.
    pub fn with_http_client(
        config: OAuth2Config,
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Result<Self, Error> {
        let token_manager = TokenManager::from_config(client.clone(), Arc::new(config));
        Self::with_token_provider(base_url, client, Arc::new(token_manager))
    }

    /// Client that sends no `Authorization` header.
    pub fn unauthenticated(base_url: impl Into<String>) -> Result<Self, Error> {
        Self::build(base_url.into(), reqwest::Client::new(), None)
    }
}

impl<AuthTokenProvider> ApiClient<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
{
    pub fn with_token_provider(
        base_url: impl Into<String>,
        client: reqwest::Client,
        auth_token_provider: Arc<AuthTokenProvider>,
    ) -> Result<Self, Error> {
        Self::build(base_url.into(), client, Some(auth_token_provider))
    }

    fn build(
        base_url: String,
        client: reqwest::Client,
        auth_token_provider: Option<Arc<AuthTokenProvider>>,
    ) -> Result<Self, Error> {
        validate_url("base_url", &base_url)?;
        let connection = Connection {
            client,
            auth_token_provider,
        };
        Ok(Self {
            base_url,
            state: Mutex::new(Some(connection)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `None` once closed, or for an unauthenticated client.
    pub fn token_provider(&self) -> Option<Arc<AuthTokenProvider>> {
        self.connection().ok()?.auth_token_provider
    }

    /// Releases the transport and this client's handle on the token provider.
    /// Returns `true` for the call that actually closed it.
    ///
    /// A token provider shared with other clients stays alive, and so does
    /// the transport clone it fetches tokens with.
    pub fn close(&self) -> bool {
        let closed = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if closed {
            debug!(message = "Closed API client", base_url = %self.base_url);
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn connection(&self) -> Result<Connection<AuthTokenProvider>, ApiCallError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ApiCallError::Closed)
    }

    /// The bearer token the next call would carry, fetching one if needed.
    /// `None` for an unauthenticated client.
    pub async fn access_token(&self) -> Result<Option<String>, Error> {
        let connection = self.connection()?;
        fetch_access_token(connection.auth_token_provider.as_deref()).await
    }

    fn build_url(&self, path: &str) -> Result<reqwest::Url, ApiCallError> {
        let url = format!("{}{}", self.base_url, path);
        reqwest::Url::parse(&url)
            .map_err(|err| ApiCallError::InvalidRequest(format!("url {url:?}: {err}")))
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        auth_token: Option<&str>,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Result<reqwest::Request, Error> {
        let url = self.build_url(path)?;
        let mut headers = headers.unwrap_or_default();

        headers.remove(AUTHORIZATION);
        if let Some(auth_token) = auth_token {
            let mut value =
                HeaderValue::from_str(&format!("Bearer {auth_token}")).map_err(|_| {
                    ApiCallError::InvalidRequest("access token is not a valid header value".into())
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let builder = client.request(method, url);
        let builder = match body {
            Some(body) => {
                let encoded = body.encode(&mut headers)?;
                builder.headers(headers).body(encoded)
            }
            None => builder.headers(headers),
        };

        let request = builder.build().map_err(ApiCallError::Transport)?;
        Ok(request)
    }

    async fn exec(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Result<reqwest::Response, Error> {
        let Connection {
            client,
            auth_token_provider,
        } = self.connection()?;
        let auth_token = fetch_access_token(auth_token_provider.as_deref()).await?;
        let request =
            self.build_request(&client, auth_token.as_deref(), method, path, headers, body)?;

        debug!(message = "Calling API", method = %request.method(), url = %request.url());

        let res = client.execute(request).await.map_err(ApiCallError::Transport)?;
        debug!(message = "API responded", status = res.status().as_u16());
        Ok(res)
    }

    /// Performs an authenticated call and decodes the response body by its
    /// `Content-Type`.
    ///
    /// Error statuses are not errors: a 404 comes back as a normal
    /// [`ApiResponse`]. Only token, transport and request-building failures
    /// are reported through `Err`.
    pub async fn call_api(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Result<ApiResponse, Error> {
        let res = self.exec(method, path, headers, body).await?;

        let status = res.status();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = res.bytes().await.map_err(ApiCallError::Transport)?;
        let body = ResponseBody::decode(content_type.as_deref(), bytes.to_vec());

        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }

    /// Streams the response body into `destination`, creating parent
    /// directories and replacing any existing file.
    ///
    /// The body is written whatever the status. If the transfer fails midway
    /// the partial file is removed.
    pub async fn download_file(
        &self,
        method: Method,
        path: &str,
        destination: impl AsRef<Path>,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Result<Download, Error> {
        let destination = destination.as_ref();
        let mut res = self.exec(method, path, headers, body).await?;
        let status = res.status();

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        // Declared before the file so the file is closed first on drop.
        let mut partial = PartialDownload {
            path: destination,
            armed: false,
        };
        let mut file = tokio::fs::File::create(destination).await?;
        partial.armed = true;

        let bytes_written = copy_body(&mut res, &mut file).await?;
        partial.armed = false;

        info!(
            message = "Downloaded file",
            path = %destination.display(),
            bytes_written,
            status = status.as_u16(),
        );

        Ok(Download {
            status,
            bytes_written,
            path: destination.to_owned(),
        })
    }
}

async fn fetch_access_token<AuthTokenProvider>(
    provider: Option<&AuthTokenProvider>,
) -> Result<Option<String>, Error>
where
    AuthTokenProvider: TokenProvider,
{
    let Some(provider) = provider else {
        return Ok(None);
    };
    let token = provider.get_auth_token().await?;
    Ok(Some(token.access_token().to_owned()))
}

/// Removes a download destination that was created but not fully written,
/// whether the copy failed or the future was dropped.
struct PartialDownload<'a> {
    path: &'a Path,
    armed: bool,
}

impl Drop for PartialDownload<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => debug!(message = "Removed partial download", path = %self.path.display()),
            Err(err) => {
                warn!(message = "Failed to remove partial download", path = %self.path.display(), error = %err)
            }
        }
    }
}

async fn copy_body(res: &mut reqwest::Response, file: &mut tokio::fs::File) -> Result<u64, Error> {
    let mut bytes_written = 0u64;
    while let Some(chunk) = res.chunk().await.map_err(ApiCallError::Transport)? {
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(bytes_written)
}

impl<AuthTokenProvider> Drop for ApiClient<AuthTokenProvider> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.take().is_some() {
            debug!(message = "Released API client transport", base_url = %self.base_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        let err = ApiClient::unauthenticated("example.com").err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn close_happens_once() {
        let client = ApiClient::unauthenticated("http://localhost:1").unwrap();
        assert!(!client.is_closed());
        assert!(client.close());
        assert!(!client.close());
        assert!(client.is_closed());
    }

    #[test]
    fn partial_download_guard_removes_file_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept");
        let dropped = dir.path().join("dropped");
        std::fs::write(&kept, b"done").unwrap();
        std::fs::write(&dropped, b"half").unwrap();

        drop(PartialDownload {
            path: &kept,
            armed: false,
        });
        drop(PartialDownload {
            path: &dropped,
            armed: true,
        });

        assert!(kept.exists());
        assert!(!dropped.exists());
    }

    #[test]
    fn caller_cannot_override_authorization() {
        let client = ApiClient::unauthenticated("http://localhost:1/api").unwrap();
        let transport = client.connection().unwrap().client;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer forged"));
        headers.insert("x-trace", HeaderValue::from_static("abc"));

        let request = client
            .build_request(&transport, Some("real"), Method::GET, "/x?y=1", Some(headers), None)
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:1/api/x?y=1");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer real");
        assert_eq!(request.headers()["x-trace"], "abc");
    }
}
