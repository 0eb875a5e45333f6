//! Cluster registry backed by the ArgoCD REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{AppStatus, ClusterRegistry, ConnectionStatus, RegisteredCluster};
use crate::error::{CheckError, RegistryError};

#[derive(Debug, Deserialize)]
struct ClusterList {
    #[serde(default)]
    items: Option<Vec<ApiCluster>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCluster {
    #[serde(default)]
    name: String,
    #[serde(default)]
    server: String,
    // Older servers report the state at the top level, newer ones under `info`.
    connection_state: Option<ApiConnectionState>,
    info: Option<ApiClusterInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiClusterInfo {
    connection_state: Option<ApiConnectionState>,
}

#[derive(Debug, Deserialize)]
struct ApiConnectionState {
    #[serde(default)]
    status: String,
    message: Option<String>,
}

impl From<ApiCluster> for RegisteredCluster {
    fn from(cluster: ApiCluster) -> Self {
        let state = cluster
            .info
            .and_then(|i| i.connection_state)
            .or(cluster.connection_state);
        let (connection, message) = match state {
            Some(state) => (ConnectionStatus::from_status(&state.status), state.message),
            None => (ConnectionStatus::Unknown, None),
        };
        Self {
            name: cluster.name,
            server: cluster.server,
            connection,
            message: message.filter(|m| !m.is_empty()),
        }
    }
}

/// Talks to `argocd-server` over HTTP(S) with a bearer token.
pub struct ArgoCdApiRegistry {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ArgoCdApiRegistry {
    /// Create a registry client for the given ArgoCD server URL.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        insecure: bool,
    ) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| CheckError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn status_error(status: StatusCode, what: &str) -> RegistryError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RegistryError::Rejected(format!(
            "ArgoCD rejected credentials ({status}) while fetching {what}"
        )),
        StatusCode::NOT_FOUND => RegistryError::Rejected(format!(
            "ArgoCD has no endpoint for {what} ({status}); check the server URL"
        )),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => RegistryError::Timeout,
        _ => RegistryError::Unavailable(format!("ArgoCD returned {status} while fetching {what}")),
    }
}

#[async_trait]
impl ClusterRegistry for ArgoCdApiRegistry {
    async fn list_clusters(&self) -> Result<Vec<RegisteredCluster>, RegistryError> {
        let response = self.get("/api/v1/clusters").send().await?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), "clusters"));
        }

        let list: ClusterList = response.json().await?;
        let clusters: Vec<RegisteredCluster> = list
            .items
            .unwrap_or_default()
            .into_iter()
            .map(RegisteredCluster::from)
            .collect();
        debug!(count = clusters.len(), "Listed clusters via ArgoCD API");
        Ok(clusters)
    }

    async fn application_status(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<AppStatus>, RegistryError> {
        let response = self
            .get(&format!("/api/v1/applications/{name}"))
            .query(&[("appNamespace", namespace)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response.status(), "application"));
        }

        let app: serde_json::Value = response.json().await?;
        Ok(Some(AppStatus::from_status_json(name, app.get("status"))))
    }
}
