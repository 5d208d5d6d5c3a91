use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    client_credentials::ClientCredentials, Clock, ExpiringToken, SystemClock, TokenProvider,
};
use crate::{
    config::{OAuth2Config, DEFAULT_EXPIRY_MARGIN},
    error::TokenFetchError,
};

/// Caches the token handed out by `Provider` and renews it shortly before it
/// expires.
///
/// The cache lock is held across the fetch, so concurrent callers that all find
/// the token missing or stale wait for one fetch and share its result.
pub struct TokenManager<Provider, C = SystemClock>
where
    Provider: TokenProvider,
{
    provider: Provider,
    clock: C,
    expiry_margin: Duration,
    cached_token: Mutex<Option<Record>>,
}

/// Upper bound on the lifetime a token endpoint can grant.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Record {
    pub access_token: String,
    pub expires_at: Instant,
    /// Point after which the token is no longer handed out.
    pub renew_at: Instant,
}

impl Record {
    pub fn from_expiring_token<T>(token: T, now: Instant, margin: Duration) -> Self
    where
        T: ExpiringToken,
    {
        let lifetime = token.lifetime().min(MAX_TOKEN_LIFETIME);
        // Short-lived tokens get renewed halfway through their lifetime.
        let usable_for = if margin < lifetime {
            lifetime - margin
        } else {
            lifetime / 2
        };
        let at = |offset: Duration| now.checked_add(offset).unwrap_or(now);
        Self {
            access_token: token.access_token().to_owned(),
            expires_at: at(lifetime),
            renew_at: at(usable_for),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.renew_at
    }
}

impl super::Token for Record {
    fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl TokenManager<ClientCredentials> {
    /// Token manager running the client-credentials flow described by `config`.
    pub fn from_config(client: reqwest::Client, config: Arc<OAuth2Config>) -> Self {
        let expiry_margin = config.expiry_margin();
        Self::new(ClientCredentials::new(client, config)).with_expiry_margin(expiry_margin)
    }
}

impl<Provider> TokenManager<Provider>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: ExpiringToken,
{
    pub fn new(provider: Provider) -> Self {
        Self::with_clock(provider, SystemClock)
    }
}

impl<Provider, C> TokenManager<Provider, C>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: ExpiringToken,
    C: Clock,
{
    pub fn with_clock(provider: Provider, clock: C) -> Self {
        let cached_token = Mutex::const_new(None);
        Self {
            provider,
            clock,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            cached_token,
        }
    }

    pub fn with_expiry_margin(mut self, expiry_margin: Duration) -> Self {
        self.expiry_margin = expiry_margin;
        self
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn fetch_new_token(&self) -> Result<Record, TokenFetchError> {
        let token = self.provider.get_auth_token().await?;
        let record = Record::from_expiring_token(token, self.clock.now(), self.expiry_margin);
        Ok(record)
    }

    /// Returns the cached token, fetching a new one if there is none or it is
    /// about to expire.
    ///
    /// A failed fetch leaves the cache as it was.
    pub async fn get_token(&self) -> Result<Record, TokenFetchError> {
        let mut cached_token = self.cached_token.lock().await;

        if let Some(cached_token) = &*cached_token {
            if !cached_token.is_expired(self.clock.now()) {
                debug!(message = "Using preexisting token", token_expires_at = ?cached_token.expires_at);
                return Ok(cached_token.clone());
            }
            debug!(message = "Existing token expired, refreshing", token_expires_at = ?cached_token.expires_at);
        }

        info!(
            message = "No active token found, about to get a new one",
            token_is_stale = cached_token.is_some(),
        );

        let new_record = self.fetch_new_token().await?;
        cached_token.replace(new_record.clone());

        debug!(message = "Got new token", token_expires_at = ?new_record.expires_at);

        Ok(new_record)
    }

    /// Fetches a new token regardless of the cached one.
    pub async fn refresh(&self) -> Result<Record, TokenFetchError> {
        let mut cached_token = self.cached_token.lock().await;
        let new_record = self.fetch_new_token().await?;
        cached_token.replace(new_record.clone());
        info!(message = "Token refreshed on demand", token_expires_at = ?new_record.expires_at);
        Ok(new_record)
    }

    /// Drops the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        if self.cached_token.lock().await.take().is_some() {
            debug!(message = "Cached token invalidated");
        }
    }

    pub async fn cached(&self) -> Option<Record> {
        self.cached_token.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl<Provider, C> TokenProvider for TokenManager<Provider, C>
where
    Provider: TokenProvider,
    <Provider as TokenProvider>::Token: ExpiringToken,
    C: Clock,
{
    type Token = Record;

    async fn get_auth_token(&self) -> Result<Self::Token, TokenFetchError> {
        let token = self.get_token().await?;
        Ok(token)
    }
}
