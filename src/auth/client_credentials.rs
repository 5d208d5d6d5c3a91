//! Authorize using the client credentials flow.

use std::{sync::Arc, time::Duration};

use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::{ClientAuthMethod, OAuth2Config},
    error::TokenFetchError,
};

pub struct ClientCredentials {
    pub client: reqwest::Client,
    pub config: Arc<OAuth2Config>,
}

impl ClientCredentials {
    pub fn new(client: reqwest::Client, config: Arc<OAuth2Config>) -> Self {
        Self { client, config }
    }

    /// Perform the client credentials flow.
    pub async fn perform(&self) -> Result<AuthResponse, TokenFetchError> {
        let config = &*self.config;
        let scope = config.scope();

        let mut params = vec![("grant_type", "client_credentials")];
        if let Some(scope) = scope.as_deref() {
            params.push(("scope", scope));
        }
        if config.auth_method() == ClientAuthMethod::Form {
            params.push(("client_id", config.client_id()));
            params.push(("client_secret", config.client_secret()));
        }

        let mut req = self
            .client
            .post(config.token_url())
            .header(ACCEPT, "application/json")
            .form(&params);
        if config.auth_method() == ClientAuthMethod::Basic {
            req = req.basic_auth(config.client_id(), Some(config.client_secret()));
        }

        debug!(
            message = "Requesting access token",
            token_url = config.token_url(),
            scope = scope.as_deref().unwrap_or_default(),
        );

        let res = req.send().await.map_err(TokenFetchError::Transport)?;
        let status = res.status();
        let body = res.text().await.map_err(TokenFetchError::Transport)?;

        if !status.is_success() {
            return Err(TokenFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        AuthResponse::parse(status.as_u16(), body)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// The requested access token.
    access_token: String,
    /// The amount of time that an access token is valid (in seconds).
    expires_in: u64,
    token_type: Option<String>,
}

impl AuthResponse {
    fn parse(status: u16, body: String) -> Result<Self, TokenFetchError> {
        let malformed = |body: String, reason: String| TokenFetchError::Malformed {
            status,
            body,
            reason,
        };

        let res: Self = match serde_json::from_str(&body) {
            Ok(res) => res,
            Err(err) => return Err(malformed(body, err.to_string())),
        };
        if res.access_token.is_empty() {
            return Err(malformed(body, "empty access_token".into()));
        }
        if let Some(token_type) = &res.token_type {
            if !token_type.eq_ignore_ascii_case("bearer") {
                let reason = format!("unsupported token_type {token_type:?}");
                return Err(malformed(body, reason));
            }
        }
        Ok(res)
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub expires_in: Duration,
}

impl From<AuthResponse> for Token {
    fn from(auth: AuthResponse) -> Self {
        let AuthResponse {
            access_token,
            expires_in,
            ..
        } = auth;
        Self {
            access_token,
            expires_in: Duration::from_secs(expires_in),
        }
    }
}

#[async_trait::async_trait]
impl super::TokenProvider for ClientCredentials {
    type Token = Token;

    async fn get_auth_token(&self) -> Result<Self::Token, TokenFetchError> {
        let auth_response = self.perform().await?;
        let token = auth_response.into();
        Ok(token)
    }
}

impl super::Token for Token {
    fn access_token(&self) -> &str {
        self.access_token.as_str()
    }
}

impl super::ExpiringToken for Token {
    fn lifetime(&self) -> Duration {
        self.expires_in
    }
}
