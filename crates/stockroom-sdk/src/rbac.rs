use std::sync::Arc;

use http::header::AUTHORIZATION;
use serde::Deserialize;
use url::Url;

use crate::{
    auth::CallCredentials,
    error::{Error, Result},
};

/// Kind of workspace resolved through the RBAC service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceType {
    Default,
    Root,
}

impl WorkspaceType {
    fn query_value(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Root => "root",
        }
    }
}

/// A workspace record returned by the RBAC v2 API.
#[derive(Debug, Clone, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub workspace_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspacePage {
    data: Vec<Workspace>,
}

/// Client for the RBAC workspace-lookup endpoint.
///
/// Sends the same [`CallCredentials`] the gRPC clients use, so an OAuth2
/// provider can back HTTP and gRPC consumers alike.
#[derive(Debug, Clone)]
pub struct RbacClient {
    base_url: Url,
    credentials: CallCredentials,
    http_client: reqwest::Client,
}

impl RbacClient {
    /// Create a client for the RBAC API rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: Url, credentials: CallCredentials) -> Self {
        Self {
            base_url,
            credentials,
            http_client: reqwest::Client::new(),
        }
    }

    /// Set a custom `reqwest::Client`.
    #[must_use]
    pub fn set_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    /// Fetch the single workspace of the given type.
    ///
    /// # Errors
    /// - Credential errors when the token exchange fails.
    /// - `Error::WorkspaceLookup` on a non-2xx response or when the service
    ///   does not return exactly one record.
    pub async fn workspace(&self, workspace_type: WorkspaceType) -> Result<Workspace> {
        let url = format!(
            "{}/api/rbac/v2/workspaces/",
            self.base_url.as_str().trim_end_matches('/')
        );
        let header = self.credentials.authorization_value().await?;

        let response = self
            .http_client
            .get(&url)
            .query(&[("type", workspace_type.query_value())])
            .header(AUTHORIZATION, Arc::unwrap_or_clone(header))
            .send()
            .await
            .map_err(Arc::new)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::WorkspaceLookup {
                url,
                reason: format!("request returned {status}"),
            });
        }

        let mut page: WorkspacePage = response.json().await.map_err(Arc::new)?;
        if page.data.len() != 1 {
            return Err(Error::WorkspaceLookup {
                url,
                reason: format!(
                    "expected exactly one {} workspace, got {}",
                    workspace_type.query_value(),
                    page.data.len()
                ),
            });
        }
        Ok(page.data.swap_remove(0))
    }

    /// Convenience lookup of the default workspace.
    ///
    /// # Errors
    /// See [`Self::workspace`].
    pub async fn default_workspace(&self) -> Result<Workspace> {
        self.workspace(WorkspaceType::Default).await
    }

    /// Convenience lookup of the root workspace.
    ///
    /// # Errors
    /// See [`Self::workspace`].
    pub async fn root_workspace(&self) -> Result<Workspace> {
        self.workspace(WorkspaceType::Root).await
    }
}
