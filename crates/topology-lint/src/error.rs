//! Error types for the topology check pipeline.

use thiserror::Error;

/// Errors surfaced by a check run.
///
/// Every variant knows which pipeline component failed and what the operator
/// should do about it, see [`CheckError::component`] and [`CheckError::hint`].
#[derive(Debug, Error)]
pub enum CheckError {
    /// The manifest could not be turned into an `ApplicationManifest`.
    #[error("malformed manifest {source_name}: {reason}")]
    MalformedManifest { source_name: String, reason: String },

    /// The controller did not answer within the probe budget or deadline.
    #[error("timed out probing controller for cluster '{cluster}' after {attempts} attempt(s)")]
    ProbeTimeout { cluster: String, attempts: u32 },

    /// The controller could not be queried at all.
    #[error("GitOps controller unavailable: {0}")]
    ControllerUnavailable(String),

    /// The workflow step file has an unrecognized shape.
    #[error("malformed workflow: {0}")]
    MalformedWorkflow(String),

    /// An input file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CheckError {
    /// Name of the pipeline component that produced the error.
    #[must_use]
    pub fn component(&self) -> &'static str {
        match self {
            Self::MalformedManifest { .. } => "manifest-parser",
            Self::ProbeTimeout { .. } | Self::ControllerUnavailable(_) => "connectivity-prober",
            Self::MalformedWorkflow(_) => "workflow-loader",
            Self::Io { .. } => "input",
            Self::Config(_) => "config",
        }
    }

    /// Remediation hint shown next to the error.
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::MalformedManifest { .. } => {
                "Ensure the Application has metadata.name, spec.source and exactly one of \
                 spec.destination.name / spec.destination.server"
            }
            Self::ProbeTimeout { .. } => {
                "Check that the hub cluster context is current and the ArgoCD API is reachable; \
                 raise --deadline if the controller is slow"
            }
            Self::ControllerUnavailable(_) => {
                "Verify the ArgoCD server URL/token or hub kubeconfig; run `argocd cluster list` \
                 against the hub context"
            }
            Self::MalformedWorkflow(_) => {
                "Provide a YAML list of commands, a list of {name, run} steps, or a GitHub \
                 Actions workflow with jobs.<id>.steps"
            }
            Self::Io { .. } => "Check the path exists and is readable",
            Self::Config(_) => "Fix the config file or the corresponding --flag / env var",
        }
    }

    /// Whether the pipeline can continue and still emit a (partial) report.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ProbeTimeout { .. } | Self::ControllerUnavailable(_))
    }
}

/// Errors returned by a [`ClusterRegistry`](crate::probe::ClusterRegistry) call.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The call did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The controller failed or returned an unusable answer; worth retrying.
    #[error("{0}")]
    Unavailable(String),

    /// The controller refused the request (bad credentials, missing
    /// endpoint). Retrying cannot help.
    #[error("{0}")]
    Rejected(String),
}

impl RegistryError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

impl From<kube::Error> for RegistryError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(response) if matches!(response.code, 401 | 403) => {
                Self::Rejected(format!("hub API server rejected credentials: {err}"))
            }
            _ => Self::Unavailable(err.to_string()),
        }
    }
}
