use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    #[error("Missing the following fields to build: {}", .missing.join(", "))]
    IncompleteConfiguration { missing: Vec<String> },
    #[error("Call credentials cannot be attached to an insecure channel.")]
    InsecureCallCredentials,
    #[error("This builder is not bound to a service. Use a service-specific builder to construct clients.")]
    UnboundBuilder,
    #[error("Invalid target address `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("OIDC discovery against `{issuer}` failed: {reason}")]
    Discovery { issuer: String, reason: String },
    #[error("Token request to `{endpoint}` failed: {reason}")]
    TokenExchange { endpoint: String, reason: String },
    #[error("Token cannot be used as a header value. Must be ASCII.")]
    InvalidHeaderValue,
    #[error("Workspace lookup at `{url}` failed: {reason}")]
    WorkspaceLookup { url: String, reason: String },
    #[error("Request failed: {0}")]
    ReqwestFailed(#[from] Arc<reqwest::Error>),
}

impl Error {
    pub(crate) fn missing_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::IncompleteConfiguration {
            missing: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_missing_single_field_has_no_trailing_separator() {
        let error = Error::missing_fields(["target"]);
        assert_eq!(
            error.to_string(),
            "Missing the following fields to build: target"
        );
    }

    #[test]
    fn test_missing_fields_are_comma_joined_in_declared_order() {
        let error = Error::missing_fields(["target", "tenant"]);
        assert_eq!(
            error.to_string(),
            "Missing the following fields to build: target, tenant"
        );
    }

    #[test]
    fn test_token_exchange_names_the_endpoint() {
        let error = Error::TokenExchange {
            endpoint: "https://idp.example.com/token".to_string(),
            reason: "invalid_client".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("https://idp.example.com/token"));
        assert!(message.contains("invalid_client"));
    }
}
