use std::collections::BTreeMap;

use typed_builder::TypedBuilder;

/// Channel option key for the HTTP/2 keepalive interval.
pub const KEEPALIVE_TIME_ARG: &str = "grpc.keepalive_time_ms";
/// Channel option key for the keepalive ping timeout.
pub const KEEPALIVE_TIMEOUT_ARG: &str = "grpc.keepalive_timeout_ms";
/// Channel option key for pinging on idle connections (1/0).
pub const KEEPALIVE_PERMIT_ARG: &str = "grpc.keepalive_permit_without_calls";
/// Channel option key for the user agent sent by the channel.
pub const PRIMARY_USER_AGENT_ARG: &str = "grpc.primary_user_agent";

pub(crate) const DEFAULT_KEEPALIVE_TIME_MS: i64 = 10_000;
pub(crate) const DEFAULT_KEEPALIVE_TIMEOUT_MS: i64 = 5_000;
pub(crate) const DEFAULT_KEEPALIVE_PERMIT_WITHOUT_CALLS: bool = true;

/// Transport-level channel security.
#[derive(Debug, Clone)]
pub enum ChannelCredentials {
    /// Plaintext connection. Incompatible with call credentials.
    Insecure,
    /// TLS. Empty material uses the system trust roots.
    Secure(TlsMaterial),
}

impl Default for ChannelCredentials {
    fn default() -> Self {
        Self::Secure(TlsMaterial::default())
    }
}

impl ChannelCredentials {
    #[must_use]
    pub fn is_insecure(&self) -> bool {
        matches!(self, Self::Insecure)
    }
}

/// PEM material for a TLS channel. All fields are optional; presenting a
/// client identity requires both `private_key` and `certificate_chain`.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option, into)))]
pub struct TlsMaterial {
    pub root_certificates: Option<String>,
    pub private_key: Option<String>,
    pub certificate_chain: Option<String>,
}

/// HTTP/2 keepalive settings.
///
/// Fields left unset resolve per-field to the defaults (10000 ms interval,
/// 5000 ms timeout, pings permitted without in-flight calls) - never to
/// previously configured values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct KeepAlive {
    pub time_ms: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub permit_without_calls: Option<bool>,
}

impl KeepAlive {
    /// Resolve into channel options under the canonical gRPC argument names.
    pub(crate) fn channel_args(self) -> BTreeMap<String, ChannelArgValue> {
        BTreeMap::from([
            (
                KEEPALIVE_TIME_ARG.to_string(),
                ChannelArgValue::Integer(self.time_ms.unwrap_or(DEFAULT_KEEPALIVE_TIME_MS)),
            ),
            (
                KEEPALIVE_TIMEOUT_ARG.to_string(),
                ChannelArgValue::Integer(self.timeout_ms.unwrap_or(DEFAULT_KEEPALIVE_TIMEOUT_MS)),
            ),
            (
                KEEPALIVE_PERMIT_ARG.to_string(),
                ChannelArgValue::from(
                    self.permit_without_calls
                        .unwrap_or(DEFAULT_KEEPALIVE_PERMIT_WITHOUT_CALLS),
                ),
            ),
        ])
    }
}

/// A channel option value. Booleans follow the gRPC convention of 1/0
/// integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelArgValue {
    Integer(i64),
    Text(String),
}

impl ChannelArgValue {
    pub(crate) fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub(crate) fn as_text(&self) -> Option<&str> {
        match self {
            Self::Integer(_) => None,
            Self::Text(value) => Some(value),
        }
    }
}

impl From<i64> for ChannelArgValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ChannelArgValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for ChannelArgValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for ChannelArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ChannelArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Bundled configuration applied through
/// [`ClientBuilder::with_config`](crate::ClientBuilder::with_config).
///
/// `None` fields leave the builder's current value untouched. A present but
/// empty `channel_args` map replaces the builder's options with an empty set.
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct ClientConfig {
    #[builder(setter(strip_option, into))]
    pub target: Option<String>,
    #[builder(setter(strip_option))]
    pub credentials: Option<ChannelCredentials>,
    #[builder(setter(strip_option))]
    pub keep_alive: Option<KeepAlive>,
    #[builder(setter(strip_option))]
    pub channel_args: Option<BTreeMap<String, ChannelArgValue>>,
}
