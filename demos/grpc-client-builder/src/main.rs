use std::str::FromStr;

use stockroom_sdk::{AuthConfig, AuthenticatedChannel, ClientBuilder};
use url::Url;

/// Stand-in for a tonic-generated service client. Generated clients are
/// constructed the same way: `InventoryServiceClient::new(channel)`.
#[derive(Debug)]
struct InventoryServiceClient {
    _channel: AuthenticatedChannel,
}

impl InventoryServiceClient {
    fn new(channel: AuthenticatedChannel) -> Self {
        Self { _channel: channel }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Bind a builder to the service constructor, then configure it fluently.
    // The channel itself connects lazily on first use; with OAuth2 configured,
    // build() performs the initial token fetch.
    let builder = ClientBuilder::for_stub(InventoryServiceClient::new)
        .with_target("inventory.example.com:9000")
        .with_auth(AuthConfig::with_discovery(
            "my-client-id",
            "my-client-secret",
            Url::from_str("https://identity.example.com")?,
        ))?;

    let client = builder.build().await?;
    println!("built client: {client:?}");

    Ok(())
}
