use std::{str::FromStr, sync::Arc};

use stockroom_sdk::{CallCredentials, ClientCredentialsProvider, RbacClient};
use url::Url;

#[tokio::main]
async fn main() {
    let client_id = "my-client-id";
    let client_secret = "my-client-secret";
    let token_endpoint = Url::from_str("https://identity.example.com/oauth2/token").unwrap();

    // Create a provider. Tokens are fetched lazily and cached until they
    // approach expiry; concurrent callers share a single exchange.
    let provider = Arc::new(
        ClientCredentialsProvider::new(client_id, client_secret, token_endpoint)
            .add_scope("inventory.read"),
    );

    let token = provider.get_token(false).await.unwrap();
    println!("access token expires at {:?}", token.expires_at());

    // The same credentials back the RBAC workspace lookup.
    let rbac = RbacClient::new(
        Url::from_str("https://console.example.com").unwrap(),
        CallCredentials::oauth2(provider),
    );
    let workspace = rbac.default_workspace().await.unwrap();
    println!("default workspace: {} ({})", workspace.name, workspace.id);
}
