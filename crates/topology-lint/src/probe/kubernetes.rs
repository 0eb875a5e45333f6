//! Cluster registry read straight from the hub's Kubernetes API.
//!
//! ArgoCD stores registered clusters as labelled Secrets in its namespace and
//! applications as `Application` custom resources. This backend reads both
//! with the hub kubeconfig. Connection state is not stored there, so clusters
//! come back with [`ConnectionStatus::Unknown`].

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::debug;

use super::{AppStatus, ClusterRegistry, ConnectionStatus, RegisteredCluster};
use crate::error::{CheckError, RegistryError};
use crate::manifest::IN_CLUSTER_SERVER;

/// Label ArgoCD puts on cluster registration secrets.
const CLUSTER_SECRET_SELECTOR: &str = "argocd.argoproj.io/secret-type=cluster";

/// ArgoCD Application API resource definition.
fn argocd_application_api() -> ApiResource {
    ApiResource {
        group: "argoproj.io".to_string(),
        version: "v1alpha1".to_string(),
        api_version: "argoproj.io/v1alpha1".to_string(),
        kind: "Application".to_string(),
        plural: "applications".to_string(),
    }
}

/// Reads ArgoCD state through the Kubernetes API of the hub.
pub struct KubeRegistry {
    client: Client,
    namespace: String,
}

impl KubeRegistry {
    /// Build a registry from a kubeconfig file (or the default one) and an
    /// optional context name.
    pub async fn from_kubeconfig(
        path: Option<&Path>,
        context: Option<&str>,
        namespace: &str,
    ) -> Result<Self, CheckError> {
        let kubeconfig = match path {
            Some(path) => Kubeconfig::read_from(path).map_err(|e| {
                CheckError::ControllerUnavailable(format!(
                    "failed to read kubeconfig from {}: {e}",
                    path.display()
                ))
            })?,
            None => Kubeconfig::read().map_err(|e| {
                CheckError::ControllerUnavailable(format!("failed to read default kubeconfig: {e}"))
            })?,
        };

        let options = KubeConfigOptions {
            context: context.map(ToString::to_string),
            ..KubeConfigOptions::default()
        };

        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| {
                CheckError::ControllerUnavailable(format!("failed to load hub context: {e}"))
            })?;

        let client = Client::try_from(config).map_err(|e| {
            CheckError::ControllerUnavailable(format!("failed to create Kubernetes client: {e}"))
        })?;

        Ok(Self::new(client, namespace))
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }
}

/// Extract a registered cluster from an ArgoCD cluster secret.
fn cluster_from_secret(secret: &Secret) -> Option<RegisteredCluster> {
    let data = secret.data.as_ref()?;
    let field = |key: &str| {
        data.get(key)
            .and_then(|v| String::from_utf8(v.0.clone()).ok())
            .filter(|s| !s.is_empty())
    };

    let server = field("server")?;
    let name = field("name").unwrap_or_else(|| server.clone());
    Some(RegisteredCluster {
        name,
        server,
        connection: ConnectionStatus::Unknown,
        message: None,
    })
}

#[async_trait]
impl ClusterRegistry for KubeRegistry {
    async fn list_clusters(&self) -> Result<Vec<RegisteredCluster>, RegistryError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let list = secrets
            .list(&ListParams::default().labels(CLUSTER_SECRET_SELECTOR))
            .await?;

        let mut clusters: Vec<RegisteredCluster> =
            list.items.iter().filter_map(cluster_from_secret).collect();

        // The hub is always available to ArgoCD as `in-cluster`, secret or not.
        if !clusters.iter().any(|c| c.server == IN_CLUSTER_SERVER) {
            clusters.push(RegisteredCluster {
                name: "in-cluster".to_string(),
                server: IN_CLUSTER_SERVER.to_string(),
                connection: ConnectionStatus::Successful,
                message: None,
            });
        }

        debug!(count = clusters.len(), namespace = %self.namespace, "Listed cluster secrets");
        Ok(clusters)
    }

    async fn application_status(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<AppStatus>, RegistryError> {
        let api_resource = argocd_application_api();
        let apps: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &api_resource);

        let app = apps.get_opt(name).await?;
        Ok(app.map(|app| AppStatus::from_status_json(name, app.data.get("status"))))
    }
}
