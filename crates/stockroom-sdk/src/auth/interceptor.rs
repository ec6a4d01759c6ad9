use std::{str::FromStr, sync::Arc};

use http::HeaderValue;
use tonic::{
    metadata::{Ascii, MetadataValue},
    service::Interceptor,
    Request, Status,
};

use crate::{
    auth::{call_credentials::CallCredentials, client_credentials::ClientCredentialsProvider},
    error::Error,
};

const AUTHORIZATION_METADATA: &str = "authorization";

/// Authentication interceptor composed into every client channel.
///
/// tonic runs interceptors on the request head, so one implementation covers
/// unary and streaming calls alike. The OAuth2 arm attaches the cached token
/// while it is still literally valid and tops the cache up in the background
/// once the token enters the expiry safety window. A missing or expired token
/// is logged and the call proceeds without the header, leaving rejection to
/// the server; a failed refresh therefore cannot take connectivity down with
/// it. An `authorization` header already present on the call is never
/// overwritten.
#[derive(Debug, Clone)]
pub enum AuthInterceptor {
    /// No call credentials configured.
    Disabled,
    /// Fixed bearer token.
    Bearer(Arc<HeaderValue>),
    /// Lazily refreshed client-credentials token.
    OAuth2(Arc<ClientCredentialsProvider>),
}

impl From<CallCredentials> for AuthInterceptor {
    fn from(credentials: CallCredentials) -> Self {
        match credentials {
            CallCredentials::Bearer(header) => Self::Bearer(header),
            CallCredentials::OAuth2(provider) => Self::OAuth2(provider),
        }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, Status> {
        if request.metadata().contains_key(AUTHORIZATION_METADATA) {
            return Ok(request);
        }
        match self {
            Self::Disabled => {}
            Self::Bearer(header) => {
                request
                    .metadata_mut()
                    .insert(AUTHORIZATION_METADATA, metadata_value(header)?);
            }
            Self::OAuth2(provider) => attach_cached_token(provider, &mut request),
        }
        Ok(request)
    }
}

fn metadata_value(header: &HeaderValue) -> std::result::Result<MetadataValue<Ascii>, Status> {
    let text = header
        .to_str()
        .map_err(|_e| Status::unauthenticated(Error::InvalidHeaderValue.to_string()))?;
    MetadataValue::from_str(text)
        .map_err(|_e| Status::unauthenticated(Error::InvalidHeaderValue.to_string()))
}

/// The fail-open path: a request never errors out of the interceptor because
/// a token could not be produced in time.
fn attach_cached_token(provider: &Arc<ClientCredentialsProvider>, request: &mut Request<()>) {
    match provider.cached_token().filter(|token| token.is_usable()) {
        Some(token) => {
            if !token.is_fresh() {
                provider.spawn_refresh();
            }
            match MetadataValue::from_str(&format!("Bearer {}", token.access_token())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.metadata_mut().insert(AUTHORIZATION_METADATA, value);
                }
                Err(_e) => tracing::warn!(
                    "Access token is not a valid header value; request proceeds unauthenticated"
                ),
            }
        }
        None => {
            tracing::warn!(
                "No usable access token available; request proceeds unauthenticated while a refresh runs"
            );
            provider.spawn_refresh();
        }
    }
}
