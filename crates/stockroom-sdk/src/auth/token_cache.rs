use std::{
    future::Future,
    sync::RwLock,
    time::{Duration, Instant},
};

use crate::error::Result;

/// Tokens count as stale this long before their literal expiry, absorbing
/// clock skew and request latency between fetch and use.
pub(crate) const EXPIRY_SAFETY_WINDOW: Duration = Duration::from_secs(300);

/// Lifetime assumed when the grant response omits `expires_in`.
pub(crate) const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// An issued access token. Immutable; a refresh stores a new instance
/// instead of mutating the old one.
#[derive(veil::Redact, Clone)]
pub struct Token {
    #[redact]
    access_token: String,
    expires_at: Instant,
}

impl Token {
    pub(crate) fn new(access_token: String, expires_at: Instant) -> Self {
        Self {
            access_token,
            expires_at,
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the token is still outside the expiry safety window.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_SAFETY_WINDOW < self.expires_at
    }

    /// Whether the token has not yet passed its literal expiry.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Single-token cache with at most one in-flight refresh.
///
/// Readers of a fresh token take a momentary read lock and never wait on a
/// refresh. The refresh lock is a `tokio` mutex because it is held across the
/// fetch await.
#[derive(Debug, Default)]
pub struct TokenCache {
    current: RwLock<Option<Token>>,
    refresh: tokio::sync::Mutex<()>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, fresh or not.
    pub(crate) fn cached(&self) -> Option<Token> {
        self.current.read().expect("Non-poisoned lock").clone()
    }

    fn cached_fresh(&self) -> Option<Token> {
        self.cached().filter(Token::is_fresh)
    }

    /// Return a token valid for at least the safety window, calling `fetch`
    /// only when the cache cannot satisfy the request.
    ///
    /// Validity is re-checked after acquiring the refresh lock, so a caller
    /// that waited behind a concurrent refresh reuses its result instead of
    /// fetching again. `force_refresh` always fetches.
    ///
    /// # Errors
    /// Propagates the error returned by `fetch`; the cache keeps the previous
    /// token in that case.
    pub async fn get_or_refresh<F, Fut>(&self, force_refresh: bool, fetch: F) -> Result<Token>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Token>>,
    {
        if !force_refresh {
            if let Some(token) = self.cached_fresh() {
                return Ok(token);
            }
        }

        let _refresh = self.refresh.lock().await;
        if !force_refresh {
            if let Some(token) = self.cached_fresh() {
                return Ok(token);
            }
        }

        let token = fetch().await?;
        *self.current.write().expect("Non-poisoned lock") = Some(token.clone());
        Ok(token)
    }
}
