//! Configuration file types.
//!
//! An optional `topology-lint.toml` supplies the topology declaration,
//! controller connection settings and probe budget. Command-line flags and
//! environment variables override anything set here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CheckError;
use crate::retry::Backoff;
use crate::topology::TopologyDeclaration;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "topology-lint.toml";

/// How the prober talks to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControllerBackend {
    /// ArgoCD REST API (`argocd-server`).
    #[default]
    Api,
    /// ArgoCD secrets and Application resources via the hub kubeconfig.
    Kube,
}

impl std::fmt::Display for ControllerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Kube => write!(f, "kube"),
        }
    }
}

impl std::str::FromStr for ControllerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "kube" => Ok(Self::Kube),
            _ => Err(anyhow::anyhow!("Unknown controller backend: {s}. Supported: api, kube")),
        }
    }
}

/// Controller connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub backend: ControllerBackend,
    /// ArgoCD server URL, for the `api` backend.
    pub url: Option<String>,
    /// Environment variable holding the ArgoCD auth token.
    pub token_env: String,
    /// Namespace ArgoCD runs in on the hub.
    pub namespace: String,
    /// Hub kubeconfig, for the `kube` backend. Defaults to the standard lookup.
    pub kubeconfig: Option<PathBuf>,
    /// Hub context, for the `kube` backend.
    pub context: Option<String>,
    /// Skip TLS verification against `argocd-server`.
    pub insecure: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: ControllerBackend::default(),
            url: None,
            token_env: "ARGOCD_AUTH_TOKEN".into(),
            namespace: "argocd".into(),
            kubeconfig: None,
            context: None,
            insecure: false,
        }
    }
}

/// Probe retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Attempts per controller call.
    pub attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay_secs: u64,
    /// Cap on a single delay.
    pub max_delay_secs: u64,
    /// Timeout for a single controller call.
    pub call_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: 20,
            initial_delay_secs: 1,
            max_delay_secs: 10,
            call_timeout_secs: 10,
        }
    }
}

impl ProbeConfig {
    /// Backoff schedule for controller calls.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self.attempts.max(1),
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            multiplier: 2.0,
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Contents of `topology-lint.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub topology: TopologyDeclaration,
    pub controller: ControllerConfig,
    pub probe: ProbeConfig,
    /// Workflow step file checked by the spoke-declaration rule.
    pub workflow: Option<PathBuf>,
}

impl FileConfig {
    /// Parse config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, CheckError> {
        toml::from_str(text).map_err(|e| CheckError::Config(e.to_string()))
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, CheckError> {
        let text = std::fs::read_to_string(path).map_err(|source| CheckError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&text)
    }

    /// Load the explicit config path, or `topology-lint.toml` if it exists,
    /// or fall back to defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, CheckError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load(default_path);
        }
        Ok(Self::default())
    }
}
