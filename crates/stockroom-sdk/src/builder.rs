use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use tonic::{
    service::interceptor::InterceptedService,
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity},
};

use crate::{
    auth::{AuthConfig, AuthInterceptor, CallCredentials, ClientCredentialsProvider},
    config::{
        ChannelArgValue, ChannelCredentials, ClientConfig, KeepAlive, TlsMaterial,
        KEEPALIVE_PERMIT_ARG, KEEPALIVE_TIMEOUT_ARG, KEEPALIVE_TIME_ARG, PRIMARY_USER_AGENT_ARG,
    },
    error::{Error, Result},
};

/// Channel type every stub built by [`ClientBuilder`] is generic over.
///
/// Generated tonic clients accept it directly:
/// `InventoryServiceClient::new(channel)`.
pub type AuthenticatedChannel = InterceptedService<Channel, AuthInterceptor>;

/// Constructor of a generated service stub, captured once per service.
pub type StubConstructor<S> = fn(AuthenticatedChannel) -> S;

enum BoundConstructor<S> {
    Unbound,
    Bound(StubConstructor<S>),
}

impl<S> Clone for BoundConstructor<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for BoundConstructor<S> {}

/// Fluent configuration for a service client.
///
/// Accumulates target, channel credentials, call credentials, keepalive and
/// channel options, validates them, and constructs a stub through the bound
/// constructor. The builder stays usable after [`Self::build`]; further
/// mutation and repeated builds produce independent stubs.
///
/// Credential conflicts are rejected as soon as they arise: attaching call
/// credentials or OAuth2 configuration to an insecure channel fails on the
/// setter, not at build time.
pub struct ClientBuilder<S = ()> {
    target: Option<String>,
    credentials: ChannelCredentials,
    call_credentials: Option<CallCredentials>,
    auth: Option<AuthConfig>,
    keep_alive: KeepAlive,
    channel_args: BTreeMap<String, ChannelArgValue>,
    construct: BoundConstructor<S>,
}

impl ClientBuilder {
    /// A builder not bound to any service; its `build` always fails. Obtain a
    /// usable builder through [`ClientBuilder::for_stub`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_constructor(BoundConstructor::Unbound)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ClientBuilder<S> {
    fn with_constructor(construct: BoundConstructor<S>) -> Self {
        Self {
            target: None,
            credentials: ChannelCredentials::default(),
            call_credentials: None,
            auth: None,
            keep_alive: KeepAlive::default(),
            channel_args: BTreeMap::new(),
            construct,
        }
    }

    /// Bind a builder to a service stub constructor.
    #[must_use]
    pub fn for_stub(construct: StubConstructor<S>) -> Self {
        Self::with_constructor(BoundConstructor::Bound(construct))
    }

    /// Set the server address, e.g. `inventory.example.com:9000`. The format
    /// is not validated here; the transport rejects malformed targets.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Use a plaintext connection.
    ///
    /// # Errors
    /// Fails if call credentials or OAuth2 configuration are already attached.
    pub fn with_insecure_credentials(self) -> Result<Self> {
        self.with_credentials_config(ChannelCredentials::Insecure)
    }

    /// Use TLS with the given PEM material. Absent material falls back to the
    /// system trust roots.
    #[must_use]
    pub fn with_secure_credentials(mut self, tls: TlsMaterial) -> Self {
        self.credentials = ChannelCredentials::Secure(tls);
        self
    }

    /// Set channel credentials from a configuration value. The last
    /// credential-setting call wins.
    ///
    /// # Errors
    /// Fails if the credentials are insecure while call credentials or OAuth2
    /// configuration are attached.
    pub fn with_credentials_config(mut self, credentials: ChannelCredentials) -> Result<Self> {
        self.credentials = credentials;
        self.validate_credentials()?;
        Ok(self)
    }

    /// Configure OAuth2 client-credentials authentication. A fresh provider
    /// is created on every [`Self::build`] call.
    ///
    /// # Errors
    /// Fails if the channel credentials are insecure.
    pub fn with_auth(mut self, auth: AuthConfig) -> Result<Self> {
        self.auth = Some(auth);
        self.validate_credentials()?;
        Ok(self)
    }

    /// Replace the keepalive settings. Fields left unset in `keep_alive`
    /// resolve to the defaults, not to previously configured values.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set one channel option, overwriting any previous value for the key.
    /// Keepalive keys set here take precedence over [`Self::with_keep_alive`].
    #[must_use]
    pub fn with_channel_arg(
        mut self,
        key: impl Into<String>,
        value: impl Into<ChannelArgValue>,
    ) -> Self {
        self.channel_args.insert(key.into(), value.into());
        self
    }

    /// Apply a configuration bundle. `None` fields preserve the builder's
    /// current values; a present but empty `channel_args` map clears the
    /// configured options.
    ///
    /// # Errors
    /// Fails if the bundle's credentials conflict with attached call
    /// credentials.
    pub fn with_config(mut self, config: &ClientConfig) -> Result<Self> {
        if let Some(target) = &config.target {
            self.target = Some(target.clone());
        }
        if let Some(keep_alive) = config.keep_alive {
            self.keep_alive = keep_alive;
        }
        if let Some(channel_args) = &config.channel_args {
            self.channel_args = channel_args.clone();
        }
        if let Some(credentials) = &config.credentials {
            self.credentials = credentials.clone();
            self.validate_credentials()?;
        }
        Ok(self)
    }

    /// Attach pre-built call credentials, optionally replacing the channel
    /// credentials in the same step.
    ///
    /// # Errors
    /// Fails if the resulting channel credentials are insecure.
    pub fn authenticated(
        mut self,
        call_credentials: CallCredentials,
        channel_credentials: Option<ChannelCredentials>,
    ) -> Result<Self> {
        if let Some(credentials) = channel_credentials {
            self.credentials = credentials;
        }
        self.call_credentials = Some(call_credentials);
        self.validate_credentials()?;
        Ok(self)
    }

    /// Attach an existing client-credentials provider as call credentials.
    /// The provider's token cache is shared by every stub built from it.
    ///
    /// # Errors
    /// Fails if the resulting channel credentials are insecure.
    pub fn oauth2_client_authenticated(
        self,
        provider: Arc<ClientCredentialsProvider>,
        channel_credentials: Option<ChannelCredentials>,
    ) -> Result<Self> {
        self.authenticated(CallCredentials::oauth2(provider), channel_credentials)
    }

    /// Check that every required field is present, naming all missing ones.
    ///
    /// # Errors
    /// `Error::IncompleteConfiguration` listing the missing fields.
    pub fn validate(&self) -> Result<&Self> {
        let mut missing = Vec::new();
        if self.target.is_none() {
            missing.push("target");
        }
        if missing.is_empty() {
            Ok(self)
        } else {
            Err(Error::missing_fields(missing))
        }
    }

    fn validate_credentials(&self) -> Result<()> {
        if self.credentials.is_insecure()
            && (self.call_credentials.is_some() || self.auth.is_some())
        {
            return Err(Error::InsecureCallCredentials);
        }
        Ok(())
    }

    /// Resolve target, TLS and channel options without performing I/O.
    pub(crate) fn connection_plan(&self) -> Result<ConnectionPlan> {
        self.validate()?;
        let target = self.target.as_deref().unwrap_or_default();
        Ok(ConnectionPlan {
            uri: resolve_uri(target, &self.credentials),
            tls: tls_config(&self.credentials),
            channel_args: self.resolved_channel_args(),
        })
    }

    /// Keepalive settings rendered into channel options, with explicitly set
    /// options layered over them.
    pub(crate) fn resolved_channel_args(&self) -> BTreeMap<String, ChannelArgValue> {
        let mut args = self.keep_alive.channel_args();
        args.extend(
            self.channel_args
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        args
    }

    /// Validate the configuration and construct a stub.
    ///
    /// Channel construction is lazy; the only network step is the initial
    /// token fetch when OAuth2 call credentials are involved, so
    /// authentication failures surface here rather than on the first call.
    ///
    /// # Errors
    /// - `Error::UnboundBuilder` if no stub constructor is bound.
    /// - `Error::IncompleteConfiguration` or `Error::InsecureCallCredentials`
    ///   on an invalid configuration.
    /// - `Error::Discovery` or `Error::TokenExchange` if OAuth2 setup fails.
    pub async fn build(&self) -> Result<S> {
        let BoundConstructor::Bound(construct) = self.construct else {
            return Err(Error::UnboundBuilder);
        };
        self.validate()?;
        self.validate_credentials()?;
        let plan = self.connection_plan()?;

        let call_credentials = match (&self.call_credentials, &self.auth) {
            (Some(credentials), _) => Some(credentials.clone()),
            (None, Some(auth)) => {
                let provider = ClientCredentialsProvider::from_config(auth).await?;
                Some(CallCredentials::oauth2(Arc::new(provider)))
            }
            (None, None) => None,
        };

        // Prime the cache so the first intercepted call carries a header and
        // authentication failures surface now.
        if let Some(CallCredentials::OAuth2(provider)) = &call_credentials {
            provider.get_token(false).await?;
        }

        let channel = plan.endpoint()?.connect_lazy();
        let interceptor = call_credentials.map_or(AuthInterceptor::Disabled, AuthInterceptor::from);
        Ok(construct(InterceptedService::new(channel, interceptor)))
    }
}

impl<S> Clone for ClientBuilder<S> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            credentials: self.credentials.clone(),
            call_credentials: self.call_credentials.clone(),
            auth: self.auth.clone(),
            keep_alive: self.keep_alive,
            channel_args: self.channel_args.clone(),
            construct: self.construct,
        }
    }
}

impl<S> fmt::Debug for ClientBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("target", &self.target)
            .field("credentials", &self.credentials)
            .field("call_credentials", &self.call_credentials)
            .field("auth", &self.auth)
            .field("keep_alive", &self.keep_alive)
            .field("channel_args", &self.channel_args)
            .field("bound", &matches!(self.construct, BoundConstructor::Bound(_)))
            .finish()
    }
}

/// Fully resolved connection inputs; no I/O has happened yet.
pub(crate) struct ConnectionPlan {
    pub(crate) uri: String,
    pub(crate) tls: Option<ClientTlsConfig>,
    pub(crate) channel_args: BTreeMap<String, ChannelArgValue>,
}

impl ConnectionPlan {
    /// Apply the plan to a tonic endpoint. Options tonic has no knob for are
    /// carried in `channel_args` but not applied.
    fn endpoint(&self) -> Result<Endpoint> {
        let mut endpoint =
            Endpoint::from_shared(self.uri.clone()).map_err(|e| Error::InvalidTarget {
                target: self.uri.clone(),
                reason: e.to_string(),
            })?;

        if let Some(interval) = self.duration_arg(KEEPALIVE_TIME_ARG) {
            endpoint = endpoint.http2_keep_alive_interval(interval);
        }
        if let Some(timeout) = self.duration_arg(KEEPALIVE_TIMEOUT_ARG) {
            endpoint = endpoint.keep_alive_timeout(timeout);
        }
        if let Some(permit) = self.integer_arg(KEEPALIVE_PERMIT_ARG) {
            endpoint = endpoint.keep_alive_while_idle(permit != 0);
        }
        if let Some(user_agent) = self.text_arg(PRIMARY_USER_AGENT_ARG) {
            endpoint = endpoint
                .user_agent(user_agent.to_string())
                .map_err(|_e| Error::InvalidHeaderValue)?;
        }
        if let Some(tls) = &self.tls {
            endpoint = endpoint
                .tls_config(tls.clone())
                .map_err(|e| Error::InvalidTarget {
                    target: self.uri.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(endpoint)
    }

    fn integer_arg(&self, key: &str) -> Option<i64> {
        self.channel_args.get(key).and_then(ChannelArgValue::as_integer)
    }

    fn duration_arg(&self, key: &str) -> Option<Duration> {
        self.integer_arg(key)
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }

    fn text_arg(&self, key: &str) -> Option<&str> {
        self.channel_args.get(key).and_then(ChannelArgValue::as_text)
    }
}

fn resolve_uri(target: &str, credentials: &ChannelCredentials) -> String {
    if target.contains("://") {
        return target.to_string();
    }
    let scheme = if credentials.is_insecure() {
        "http"
    } else {
        "https"
    };
    format!("{scheme}://{target}")
}

fn tls_config(credentials: &ChannelCredentials) -> Option<ClientTlsConfig> {
    match credentials {
        ChannelCredentials::Insecure => None,
        ChannelCredentials::Secure(material) => {
            let mut tls = ClientTlsConfig::new().with_native_roots();
            if let Some(root) = &material.root_certificates {
                tls = tls.ca_certificate(Certificate::from_pem(root));
            }
            if let (Some(key), Some(chain)) =
                (&material.private_key, &material.certificate_chain)
            {
                tls = tls.identity(Identity::from_pem(chain, key));
            }
            Some(tls)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug)]
    struct EchoStub;

    fn echo_stub(_channel: AuthenticatedChannel) -> EchoStub {
        EchoStub
    }

    fn builder() -> ClientBuilder<EchoStub> {
        ClientBuilder::for_stub(echo_stub)
    }

    #[test]
    fn test_validate_requires_target() {
        let error = builder().validate().unwrap_err();
        assert!(error.to_string().contains("target"));

        let bound = builder().with_target("localhost:9000");
        assert!(bound.validate().is_ok());
    }

    #[test]
    fn test_insecure_plan_uses_plaintext_scheme() {
        let plan = builder()
            .with_target("localhost:9000")
            .with_insecure_credentials()
            .unwrap()
            .connection_plan()
            .unwrap();

        assert_eq!(plan.uri, "http://localhost:9000");
        assert!(plan.tls.is_none());
    }

    #[test]
    fn test_default_credentials_are_secure() {
        let plan = builder()
            .with_target("inventory.example.com:443")
            .connection_plan()
            .unwrap();

        assert_eq!(plan.uri, "https://inventory.example.com:443");
        assert!(plan.tls.is_some());
    }

    #[test]
    fn test_explicit_scheme_is_preserved() {
        let plan = builder()
            .with_target("http://localhost:9000")
            .with_insecure_credentials()
            .unwrap()
            .connection_plan()
            .unwrap();

        assert_eq!(plan.uri, "http://localhost:9000");
    }

    #[test]
    fn test_call_credentials_rejected_on_insecure_channel() {
        let error = builder()
            .with_target("localhost:9000")
            .with_insecure_credentials()
            .unwrap()
            .authenticated(CallCredentials::bearer("my-token").unwrap(), None)
            .unwrap_err();

        assert!(matches!(error, Error::InsecureCallCredentials));
    }

    #[test]
    fn test_insecure_rejected_once_call_credentials_attached() {
        let error = builder()
            .with_target("localhost:9000")
            .authenticated(CallCredentials::bearer("my-token").unwrap(), None)
            .unwrap()
            .with_insecure_credentials()
            .unwrap_err();

        assert!(matches!(error, Error::InsecureCallCredentials));
    }

    #[test]
    fn test_credential_combinations() {
        // secure + call credentials
        assert!(builder()
            .authenticated(CallCredentials::bearer("t").unwrap(), None)
            .is_ok());
        // secure + none
        assert!(builder().validate_credentials().is_ok());
        // insecure + none
        assert!(builder().with_insecure_credentials().is_ok());
    }

    #[test]
    fn test_keepalive_defaults_in_resolved_args() {
        let args = builder().resolved_channel_args();
        assert_eq!(
            args.get(KEEPALIVE_TIME_ARG),
            Some(&ChannelArgValue::Integer(10_000))
        );
        assert_eq!(
            args.get(KEEPALIVE_TIMEOUT_ARG),
            Some(&ChannelArgValue::Integer(5_000))
        );
        assert_eq!(
            args.get(KEEPALIVE_PERMIT_ARG),
            Some(&ChannelArgValue::Integer(1))
        );
    }

    #[test]
    fn test_keepalive_merges_with_defaults_not_previous_values() {
        let args = builder()
            .with_keep_alive(KeepAlive::builder().timeout_ms(9_000).build())
            .with_keep_alive(KeepAlive::builder().time_ms(20_000).build())
            .resolved_channel_args();

        assert_eq!(
            args.get(KEEPALIVE_TIME_ARG),
            Some(&ChannelArgValue::Integer(20_000))
        );
        // timeout_ms fell back to its default, not to the previous 9000.
        assert_eq!(
            args.get(KEEPALIVE_TIMEOUT_ARG),
            Some(&ChannelArgValue::Integer(5_000))
        );
    }

    #[test]
    fn test_channel_arg_overwrites_previous_value() {
        let args = builder()
            .with_channel_arg("grpc.enable_retries", 1)
            .with_channel_arg("grpc.enable_retries", 0)
            .resolved_channel_args();

        assert_eq!(
            args.get("grpc.enable_retries"),
            Some(&ChannelArgValue::Integer(0))
        );
    }

    #[test]
    fn test_explicit_channel_arg_overrides_keepalive() {
        let args = builder()
            .with_keep_alive(KeepAlive::builder().time_ms(20_000).build())
            .with_channel_arg(KEEPALIVE_TIME_ARG, 30_000)
            .resolved_channel_args();

        assert_eq!(
            args.get(KEEPALIVE_TIME_ARG),
            Some(&ChannelArgValue::Integer(30_000))
        );
    }

    #[test]
    fn test_with_config_skips_absent_fields() {
        let config = ClientConfig::builder()
            .keep_alive(KeepAlive::builder().time_ms(20_000).build())
            .build();

        let updated = builder()
            .with_target("localhost:9000")
            .with_config(&config)
            .unwrap();

        // target untouched, keepalive replaced
        assert!(updated.validate().is_ok());
        assert_eq!(
            updated.resolved_channel_args().get(KEEPALIVE_TIME_ARG),
            Some(&ChannelArgValue::Integer(20_000))
        );
    }

    #[test]
    fn test_with_config_applies_present_target() {
        let config = ClientConfig::builder().target("inventory.example.com:443").build();
        let updated = builder().with_config(&config).unwrap();
        assert!(updated.validate().is_ok());
    }

    #[test]
    fn test_with_config_empty_args_clear_existing_options() {
        let config = ClientConfig::builder()
            .channel_args(BTreeMap::new())
            .build();

        let updated = builder()
            .with_channel_arg("grpc.enable_retries", 1)
            .with_config(&config)
            .unwrap();

        assert!(updated
            .resolved_channel_args()
            .get("grpc.enable_retries")
            .is_none());
    }

    #[tokio::test]
    async fn test_unbound_builder_never_builds() {
        let error = ClientBuilder::new()
            .with_target("localhost:9000")
            .build()
            .await
            .unwrap_err();

        assert!(matches!(error, Error::UnboundBuilder));
        assert_eq!(
            error.to_string(),
            "This builder is not bound to a service. Use a service-specific builder to construct clients."
        );
    }

    #[tokio::test]
    async fn test_build_constructs_stub_over_insecure_channel() {
        let builder = builder()
            .with_target("localhost:9000")
            .with_insecure_credentials()
            .unwrap();

        let stub = builder.build().await.unwrap();
        assert!(matches!(stub, EchoStub));
    }

    #[tokio::test]
    async fn test_builder_is_reusable_after_build() {
        let builder = builder()
            .with_target("localhost:9000")
            .with_insecure_credentials()
            .unwrap();

        builder.build().await.unwrap();
        let rebuilt = builder.with_target("localhost:9001").build().await;
        assert!(rebuilt.is_ok());
    }

    #[tokio::test]
    async fn test_build_without_target_lists_the_field() {
        let error = builder().build().await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "Missing the following fields to build: target"
        );
    }
}
