//! Client-credentials configuration.

use std::{fmt, time::Duration};

use serde::Deserialize;

use crate::error::ConfigurationError;

/// Tokens are renewed this long before they actually expire.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where the client credentials go in the token request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// `client_id` and `client_secret` as form fields.
    #[default]
    Form,
    /// HTTP Basic `Authorization` header.
    Basic,
}

/// Immutable, validated settings for the client-credentials grant.
///
/// ```
/// use oauth2_api_client::OAuth2Config;
///
/// let config = OAuth2Config::new(
///     "https://auth.example.com/oauth/token",
///     "my-client",
///     "my-secret",
///     ["read", "write"],
/// )
/// .unwrap();
/// assert_eq!(config.scope(), Some("read write".to_owned()));
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct OAuth2Config {
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    auth_method: ClientAuthMethod,
    expiry_margin: Duration,
}

impl OAuth2Config {
    pub fn new<S>(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: impl IntoIterator<Item = S>,
    ) -> Result<Self, ConfigurationError>
    where
        S: Into<String>,
    {
        let token_url = token_url.into();
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();

        validate_url("token_url", &token_url)?;
        if client_id.is_empty() {
            return Err(ConfigurationError::Empty("client_id"));
        }
        if client_secret.is_empty() {
            return Err(ConfigurationError::Empty("client_secret"));
        }
        if let Some(scope) = scopes
            .iter()
            .find(|scope| scope.is_empty() || scope.contains(char::is_whitespace))
        {
            return Err(ConfigurationError::InvalidScope(scope.clone()));
        }

        Ok(Self {
            token_url,
            client_id,
            client_secret,
            scopes,
            auth_method: ClientAuthMethod::default(),
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
        })
    }

    pub fn with_auth_method(mut self, auth_method: ClientAuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    pub fn with_expiry_margin(mut self, expiry_margin: Duration) -> Self {
        self.expiry_margin = expiry_margin;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Scopes joined by a single space, or `None` when no scope is requested.
    pub fn scope(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(" "))
        }
    }

    pub fn auth_method(&self) -> ClientAuthMethod {
        self.auth_method
    }

    pub fn expiry_margin(&self) -> Duration {
        self.expiry_margin
    }
}

impl fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("auth_method", &self.auth_method)
            .field("expiry_margin", &self.expiry_margin)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawConfig {
    token_url: String,
    client_id: String,
    client_secret: String,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    auth_method: ClientAuthMethod,
    expiry_margin_secs: Option<u64>,
}

impl TryFrom<RawConfig> for OAuth2Config {
    type Error = ConfigurationError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let config = Self::new(raw.token_url, raw.client_id, raw.client_secret, raw.scopes)?
            .with_auth_method(raw.auth_method);
        Ok(match raw.expiry_margin_secs {
            Some(secs) => config.with_expiry_margin(Duration::from_secs(secs)),
            None => config,
        })
    }
}

/// Checks that `value` is an absolute http(s) URL.
pub(crate) fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.is_empty() {
        return Err(ConfigurationError::Empty(field));
    }
    let url = reqwest::Url::parse(value).map_err(|err| ConfigurationError::InvalidUrl {
        field,
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigurationError::InvalidUrl {
            field,
            reason: format!("unsupported scheme {scheme:?}"),
        }),
    }
}
