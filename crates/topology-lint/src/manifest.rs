//! ArgoCD `Application` manifest parsing.
//!
//! Turns raw YAML into [`ApplicationManifest`] values. Only the fields the
//! topology rules care about are kept; everything else in the document is
//! ignored.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CheckError;

/// The well-known in-cluster API endpoint. A destination pointing here
/// always lands on the hub cluster that runs the controller.
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

/// Namespace ArgoCD applications live in when metadata omits it.
const DEFAULT_APP_NAMESPACE: &str = "argocd";

/// Reference to a deployment target cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRef {
    /// Cluster name as registered with the controller.
    Name(String),
    /// Literal API server URL.
    Server(String),
}

impl ClusterRef {
    /// Whether this reference resolves to the controller's own cluster.
    #[must_use]
    pub fn is_in_cluster(&self) -> bool {
        match self {
            Self::Server(url) => normalize_server(url) == IN_CLUSTER_SERVER,
            Self::Name(name) => name == "in-cluster",
        }
    }

    /// The registered name, for name-form references.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Server(_) => None,
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name: {name}"),
            Self::Server(url) => write!(f, "server: {url}"),
        }
    }
}

/// Strip the default port and trailing slash so equivalent URLs compare equal.
fn normalize_server(url: &str) -> &str {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(":443").unwrap_or(url)
}

/// Where the manifests come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub repo_url: String,
    pub path: Option<String>,
    pub chart: Option<String>,
    pub target_revision: String,
}

/// Where the application is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub cluster: ClusterRef,
    pub namespace: Option<String>,
}

/// Backoff section of a retry policy. Durations are kept verbatim
/// (`5s`, `3m`) and interpreted by the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryBackoff {
    pub duration: Option<String>,
    pub factor: Option<i64>,
    pub max_duration: Option<String>,
}

/// Retry policy of a sync. A negative limit means unlimited retries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub limit: Option<i64>,
    pub backoff: Option<RetryBackoff>,
}

/// Sync behaviour flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPolicy {
    pub automated: bool,
    pub prune: bool,
    pub self_heal: bool,
    pub create_namespace: bool,
    pub sync_options: Vec<String>,
    pub retry: Option<RetryPolicy>,
}

/// A parsed ArgoCD `Application`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationManifest {
    pub name: String,
    pub namespace: String,
    pub project: String,
    pub sources: Vec<Source>,
    pub destination: Destination,
    pub sync_policy: SyncPolicy,
}

// Raw document shape, as written in YAML.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    kind: Option<String>,
    metadata: Option<RawMetadata>,
    spec: Option<RawSpec>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpec {
    project: Option<String>,
    source: Option<RawSource>,
    #[serde(default)]
    sources: Vec<RawSource>,
    destination: Option<RawDestination>,
    sync_policy: Option<RawSyncPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    #[serde(rename = "repoURL")]
    repo_url: Option<String>,
    path: Option<String>,
    chart: Option<String>,
    target_revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDestination {
    server: Option<String>,
    name: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSyncPolicy {
    automated: Option<RawAutomated>,
    #[serde(default)]
    sync_options: Vec<String>,
    retry: Option<RetryPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAutomated {
    #[serde(default)]
    prune: bool,
    #[serde(default)]
    self_heal: bool,
}

/// Parse every `Application` document in `text`.
///
/// Documents of another `kind` are skipped. `source_name` is only used in
/// error messages.
pub fn parse_manifests(
    text: &str,
    source_name: &str,
) -> Result<Vec<ApplicationManifest>, CheckError> {
    let mut apps = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| malformed(source_name, format!("document {index}: {e}")))?;

        if value.is_null() {
            continue;
        }

        let raw: RawDocument = serde_yaml::from_value(value)
            .map_err(|e| malformed(source_name, format!("document {index}: {e}")))?;

        if let Some(kind) = raw.kind.as_deref() {
            if kind != "Application" {
                debug!(source = source_name, index, kind, "Skipping non-Application document");
                continue;
            }
        }

        let app = from_raw(raw)
            .map_err(|reason| malformed(source_name, format!("document {index}: {reason}")))?;
        debug!(
            source = source_name,
            app = %app.name,
            destination = %app.destination.cluster,
            "Parsed application"
        );
        apps.push(app);
    }

    if apps.is_empty() {
        return Err(malformed(source_name, "no Application document found".to_string()));
    }

    Ok(apps)
}

/// Parse a manifest that must contain exactly one `Application`.
pub fn parse_manifest(text: &str, source_name: &str) -> Result<ApplicationManifest, CheckError> {
    let mut apps = parse_manifests(text, source_name)?;
    if apps.len() > 1 {
        return Err(malformed(
            source_name,
            format!("expected a single Application, found {}", apps.len()),
        ));
    }
    Ok(apps.remove(0))
}

/// Read and parse all applications from a file.
pub fn load_manifests(path: &Path) -> Result<Vec<ApplicationManifest>, CheckError> {
    let text = std::fs::read_to_string(path).map_err(|source| CheckError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_manifests(&text, &path.display().to_string())
}

fn malformed(source_name: &str, reason: String) -> CheckError {
    CheckError::MalformedManifest {
        source_name: source_name.to_string(),
        reason,
    }
}

fn from_raw(raw: RawDocument) -> Result<ApplicationManifest, String> {
    let metadata = raw.metadata.ok_or("missing metadata")?;
    let name = non_empty(metadata.name).ok_or("missing metadata.name")?;
    let spec = raw.spec.ok_or("missing spec")?;

    let mut raw_sources = spec.sources;
    if let Some(source) = spec.source {
        raw_sources.insert(0, source);
    }
    if raw_sources.is_empty() {
        return Err("missing spec.source".into());
    }
    let sources = raw_sources
        .into_iter()
        .map(|s| -> Result<Source, String> {
            let repo_url = non_empty(s.repo_url).ok_or("source is missing repoURL")?;
            Ok(Source {
                repo_url,
                path: s.path,
                chart: s.chart,
                target_revision: s.target_revision.unwrap_or_else(|| "HEAD".to_string()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let destination = spec.destination.ok_or("missing spec.destination")?;
    let cluster = match (non_empty(destination.name), non_empty(destination.server)) {
        (Some(name), None) => ClusterRef::Name(name),
        (None, Some(server)) => ClusterRef::Server(server),
        (Some(_), Some(_)) => {
            return Err("spec.destination sets both name and server; use exactly one".into())
        }
        (None, None) => return Err("spec.destination needs a name or server".into()),
    };

    let sync_policy = spec
        .sync_policy
        .map(|policy| {
            let create_namespace = policy
                .sync_options
                .iter()
                .any(|opt| opt.replace(' ', "").eq_ignore_ascii_case("CreateNamespace=true"));
            let automated = policy.automated.is_some();
            let auto = policy.automated.unwrap_or_default();
            SyncPolicy {
                automated,
                prune: auto.prune,
                self_heal: auto.self_heal,
                create_namespace,
                sync_options: policy.sync_options,
                retry: policy.retry,
            }
        })
        .unwrap_or_default();

    Ok(ApplicationManifest {
        name,
        namespace: non_empty(metadata.namespace)
            .unwrap_or_else(|| DEFAULT_APP_NAMESPACE.to_string()),
        project: non_empty(spec.project).unwrap_or_else(|| "default".to_string()),
        sources,
        destination: Destination {
            cluster,
            namespace: destination.namespace,
        },
        sync_policy,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPOKE_APP: &str = r"
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: web
  namespace: argocd
spec:
  project: platform
  source:
    repoURL: https://github.com/acme/apps
    path: web
    targetRevision: main
  destination:
    name: opsera-usw2-np
    namespace: web
  syncPolicy:
    automated:
      prune: true
      selfHeal: true
    syncOptions:
      - CreateNamespace=true
    retry:
      limit: 5
      backoff:
        duration: 5s
        factor: 2
        maxDuration: 3m
";

    #[test]
    fn test_parse_name_destination() {
        let app = parse_manifest(SPOKE_APP, "web.yaml").unwrap();
        assert_eq!(app.name, "web");
        assert_eq!(app.project, "platform");
        assert_eq!(app.destination.cluster, ClusterRef::Name("opsera-usw2-np".into()));
        assert_eq!(app.destination.namespace.as_deref(), Some("web"));
        assert!(app.sync_policy.automated);
        assert!(app.sync_policy.prune);
        assert!(app.sync_policy.self_heal);
        assert!(app.sync_policy.create_namespace);

        let retry = app.sync_policy.retry.unwrap();
        assert_eq!(retry.limit, Some(5));
        assert_eq!(retry.backoff.unwrap().max_duration.as_deref(), Some("3m"));
    }

    #[test]
    fn test_in_cluster_detection() {
        assert!(ClusterRef::Server("https://kubernetes.default.svc".into()).is_in_cluster());
        assert!(ClusterRef::Server("https://kubernetes.default.svc:443/".into()).is_in_cluster());
        assert!(!ClusterRef::Server("https://10.0.0.1:6443".into()).is_in_cluster());
        assert!(!ClusterRef::Name("opsera-usw2-np".into()).is_in_cluster());
    }

    #[test]
    fn test_both_name_and_server_is_malformed() {
        let text = SPOKE_APP.replace(
            "    name: opsera-usw2-np\n",
            "    name: opsera-usw2-np\n    server: https://kubernetes.default.svc\n",
        );
        let err = parse_manifest(&text, "web.yaml").unwrap_err();
        assert!(matches!(err, CheckError::MalformedManifest { .. }));
        assert!(err.to_string().contains("both name and server"));
    }

    #[test]
    fn test_missing_destination_is_malformed() {
        let text = r"
kind: Application
metadata:
  name: web
spec:
  source:
    repoURL: https://github.com/acme/apps
";
        let err = parse_manifest(text, "web.yaml").unwrap_err();
        assert!(err.to_string().contains("missing spec.destination"));
    }

    #[test]
    fn test_missing_source_is_malformed() {
        let text = r"
kind: Application
metadata:
  name: web
spec:
  destination:
    name: opsera-usw2-np
";
        let err = parse_manifest(text, "web.yaml").unwrap_err();
        assert!(err.to_string().contains("missing spec.source"));
    }

    #[test]
    fn test_multi_document_skips_other_kinds() {
        let project =
            "apiVersion: argoproj.io/v1alpha1\nkind: AppProject\nmetadata:\n  name: platform";
        let text = format!("{project}\n---\n{SPOKE_APP}");
        let apps = parse_manifests(&text, "bundle.yaml").unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "web");
    }

    #[test]
    fn test_no_application_is_malformed() {
        let err =
            parse_manifests("kind: ConfigMap\nmetadata:\n  name: x\n", "cm.yaml").unwrap_err();
        assert!(err.to_string().contains("no Application document found"));
    }

    #[test]
    fn test_multi_source_and_defaults() {
        let text = r"
kind: Application
metadata:
  name: charts
spec:
  sources:
    - repoURL: https://charts.example.com
      chart: nginx
  destination:
    server: https://kubernetes.default.svc
";
        let app = parse_manifest(text, "charts.yaml").unwrap();
        assert_eq!(app.namespace, "argocd");
        assert_eq!(app.project, "default");
        assert_eq!(app.sources[0].target_revision, "HEAD");
        assert_eq!(app.sources[0].chart.as_deref(), Some("nginx"));
        assert_eq!(app.sync_policy, SyncPolicy::default());
    }

    #[test]
    fn test_invalid_yaml_is_malformed() {
        let err = parse_manifest("kind: [unterminated", "bad.yaml").unwrap_err();
        assert!(matches!(err, CheckError::MalformedManifest { .. }));
    }
}
