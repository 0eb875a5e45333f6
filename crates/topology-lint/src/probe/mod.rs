//! Connectivity probing against the GitOps controller.
//!
//! The prober asks the controller (through a [`ClusterRegistry`]) whether the
//! spoke is registered, whether the controller can reach it, and what sync
//! status the checked applications report. An `Unknown` sync status points
//! at a registration or reachability problem rather than a sync conflict.

pub mod argocd;
pub mod kubernetes;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CheckError, RegistryError};
use crate::retry::{retry_if, Backoff, RetryError};

pub use self::argocd::ArgoCdApiRegistry;
pub use self::kubernetes::KubeRegistry;

/// Outcome of probing the spoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeVerdict {
    /// Spoke is registered and applications report a known sync status.
    Registered,
    /// Spoke name is not in the controller's cluster list.
    NotRegistered,
    /// Spoke is registered but the controller cannot connect to it.
    Unreachable,
    /// Sync status is Unknown, or the controller did not answer in time.
    Unknown,
}

impl fmt::Display for ProbeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "Registered"),
            Self::NotRegistered => write!(f, "NotRegistered"),
            Self::Unreachable => write!(f, "Unreachable"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Controller-side connection state of a registered cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Successful,
    Failed,
    Unknown,
}

impl ConnectionStatus {
    /// Map the controller's status string.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status {
            "Successful" => Self::Successful,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// A cluster known to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredCluster {
    pub name: String,
    pub server: String,
    pub connection: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Application status as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppStatus {
    /// Application name.
    pub name: String,
    /// Sync status (Synced, OutOfSync, Unknown).
    pub sync_status: String,
    /// Health status (Healthy, Degraded, Progressing, Missing, Unknown).
    pub health_status: String,
    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AppStatus {
    /// Build from an Application's `status` object.
    #[must_use]
    pub fn from_status_json(name: &str, status: Option<&serde_json::Value>) -> Self {
        let field = |section: &str, key: &str| {
            status
                .and_then(|s| s.get(section))
                .and_then(|s| s.get(key))
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
        };

        Self {
            name: name.to_string(),
            sync_status: field("sync", "status").unwrap_or_else(|| "Unknown".to_string()),
            health_status: field("health", "status").unwrap_or_else(|| "Unknown".to_string()),
            message: field("health", "message"),
        }
    }
}

/// Read-only view of the controller's cluster registry.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// List clusters registered with the controller.
    async fn list_clusters(&self) -> Result<Vec<RegisteredCluster>, RegistryError>;

    /// Fetch an application's status; `None` when it does not exist.
    async fn application_status(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<AppStatus>, RegistryError>;
}

/// An application to query during the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRef {
    pub name: String,
    pub namespace: String,
}

/// Everything the probe learned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub verdict: ProbeVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<RegisteredCluster>,
    pub applications: Vec<AppStatus>,
    /// Applications the controller does not know about.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_applications: Vec<String>,
}

/// Queries the controller with bounded, retried calls.
pub struct ConnectivityProber {
    registry: Box<dyn ClusterRegistry>,
    backoff: Backoff,
    call_timeout: Duration,
}

impl ConnectivityProber {
    /// Create a prober with the default backoff and a 10 second call timeout.
    #[must_use]
    pub fn new(registry: Box<dyn ClusterRegistry>) -> Self {
        Self {
            registry,
            backoff: Backoff::default(),
            call_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Probe the spoke and the given applications.
    ///
    /// `deadline` takes precedence over the retry budget.
    pub async fn probe(
        &self,
        spoke: &str,
        apps: &[AppRef],
        deadline: Option<Instant>,
    ) -> Result<ProbeOutcome, CheckError> {
        info!(spoke = %spoke, apps = apps.len(), "Probing GitOps controller");

        let clusters = self
            .call(spoke, deadline, || self.registry.list_clusters())
            .await?;
        debug!(count = clusters.len(), "Controller returned registered clusters");

        let Some(cluster) = clusters.into_iter().find(|c| c.name == spoke) else {
            warn!(spoke = %spoke, "Spoke cluster is not registered with the controller");
            return Ok(ProbeOutcome {
                verdict: ProbeVerdict::NotRegistered,
                cluster: None,
                applications: Vec::new(),
                missing_applications: Vec::new(),
            });
        };

        if cluster.connection == ConnectionStatus::Failed {
            warn!(
                spoke = %spoke,
                message = cluster.message.as_deref().unwrap_or(""),
                "Controller cannot connect to spoke cluster"
            );
            return Ok(ProbeOutcome {
                verdict: ProbeVerdict::Unreachable,
                cluster: Some(cluster),
                applications: Vec::new(),
                missing_applications: Vec::new(),
            });
        }

        let mut applications = Vec::new();
        let mut missing_applications = Vec::new();
        for app in apps {
            let status = self
                .call(spoke, deadline, || {
                    self.registry.application_status(&app.name, &app.namespace)
                })
                .await?;
            match status {
                Some(status) => {
                    debug!(
                        app = %status.name,
                        sync = %status.sync_status,
                        health = %status.health_status,
                        "Application status"
                    );
                    applications.push(status);
                }
                None => {
                    warn!(
                        app = %app.name,
                        namespace = %app.namespace,
                        "Application not found on controller"
                    );
                    missing_applications.push(app.name.clone());
                }
            }
        }

        let verdict = if applications.iter().any(|a| a.sync_status == "Unknown") {
            ProbeVerdict::Unknown
        } else {
            ProbeVerdict::Registered
        };

        Ok(ProbeOutcome {
            verdict,
            cluster: Some(cluster),
            applications,
            missing_applications,
        })
    }

    /// Check the controller answers at all, returning how many clusters it knows.
    ///
    /// Used when no spoke is declared and there is nothing to look up.
    pub async fn ping(&self, deadline: Option<Instant>) -> Result<usize, CheckError> {
        let clusters = self
            .call("<controller>", deadline, || self.registry.list_clusters())
            .await?;
        debug!(count = clusters.len(), "Controller is answering");
        Ok(clusters.len())
    }

    /// One controller call with per-call timeout and retries. Rejected
    /// requests fail on the first attempt.
    async fn call<T, F, Fut>(
        &self,
        spoke: &str,
        deadline: Option<Instant>,
        mut op: F,
    ) -> Result<T, CheckError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let call_timeout = self.call_timeout;
        let result = retry_if(
            &self.backoff,
            deadline,
            |_| {
                let fut = op();
                async move {
                    tokio::time::timeout(call_timeout, fut)
                        .await
                        .unwrap_or(Err(RegistryError::Timeout))
                }
            },
            RegistryError::is_retryable,
        )
        .await;

        result.map_err(|err| match err {
            RetryError::DeadlineExceeded { attempts, .. }
            | RetryError::Exhausted {
                attempts,
                last: RegistryError::Timeout,
            }
            | RetryError::Aborted {
                attempts,
                last: RegistryError::Timeout,
            } => CheckError::ProbeTimeout {
                cluster: spoke.to_string(),
                attempts,
            },
            RetryError::Exhausted {
                last: RegistryError::Unavailable(message) | RegistryError::Rejected(message),
                ..
            }
            | RetryError::Aborted {
                last: RegistryError::Unavailable(message) | RegistryError::Rejected(message),
                ..
            } => CheckError::ControllerUnavailable(message),
        })
    }
}
