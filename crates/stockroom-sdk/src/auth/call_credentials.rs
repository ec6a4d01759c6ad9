use std::{fmt, sync::Arc};

use http::HeaderValue;

use crate::{
    auth::{client_credentials::ClientCredentialsProvider, require_ascii},
    error::{Error, Result},
};

/// Per-request authentication material.
///
/// Composed onto a secure channel by the builder, or consumed directly by
/// HTTP helpers such as [`RbacClient`](crate::RbacClient). Only valid on
/// encrypted channels; the builder rejects the insecure combination.
#[derive(Clone)]
pub enum CallCredentials {
    /// A fixed token attached as `Bearer <token>`.
    Bearer(Arc<HeaderValue>),
    /// Tokens minted on demand through the client-credentials grant.
    OAuth2(Arc<ClientCredentialsProvider>),
}

impl CallCredentials {
    /// Wrap a fixed access token. Pass only the token, without the `Bearer`
    /// prefix.
    ///
    /// # Errors
    /// Fails if `Bearer {token}` is not a valid ASCII header value.
    pub fn bearer(token: &str) -> Result<Self> {
        require_ascii(token)?;
        Ok(Self::Bearer(Arc::new(bearer_header(token)?)))
    }

    /// Mint per-request tokens from an OAuth2 client-credentials provider.
    #[must_use]
    pub fn oauth2(provider: Arc<ClientCredentialsProvider>) -> Self {
        Self::OAuth2(provider)
    }

    /// The authorization header for the next request, refreshing the
    /// underlying token when needed.
    ///
    /// # Errors
    /// Fails when the token exchange fails or yields a non-ASCII token.
    pub async fn authorization_value(&self) -> Result<Arc<HeaderValue>> {
        match self {
            Self::Bearer(header) => Ok(header.clone()),
            Self::OAuth2(provider) => {
                let token = provider.get_token(false).await?;
                bearer_header(token.access_token()).map(Arc::new)
            }
        }
    }
}

impl fmt::Debug for CallCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::OAuth2(provider) => f.debug_tuple("OAuth2").field(provider).finish(),
        }
    }
}

/// Build a sensitive `Bearer <token>` header value.
pub(crate) fn bearer_header(token: &str) -> Result<HeaderValue> {
    let mut header =
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_e| Error::InvalidHeaderValue)?;
    header.set_sensitive(true);
    Ok(header)
}
