//! End-to-end checks: manifest files in, report out.

#![allow(clippy::missing_panics_doc)]

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use topology_lint::check::{run_check, CheckRequest};
use topology_lint::report::{EXIT_OK, EXIT_VIOLATIONS};
use topology_lint::{CheckError, ProbeVerdict, RuleId, Severity, TopologyDeclaration};

const SERVER_FORM: &str = r"
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: guestbook
  namespace: argocd
spec:
  project: default
  source:
    repoURL: https://github.com/example/gitops
    path: apps/guestbook
    targetRevision: main
  destination:
    server: https://kubernetes.default.svc
    namespace: guestbook
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

const NAME_FORM: &str = r"
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: guestbook
spec:
  source:
    repoURL: https://github.com/example/gitops
    path: apps/guestbook
  destination:
    name: opsera-usw2-np
    namespace: guestbook
  syncPolicy:
    syncOptions:
      - CreateNamespace=true
    retry:
      limit: 5
      backoff:
        duration: 5s
        maxDuration: 3m
";

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn declared() -> TopologyDeclaration {
    TopologyDeclaration::new("argocd-usw2", "opsera-usw2-np")
}

#[tokio::test]
async fn scenario_a_server_form_destination_fails() {
    let dir = tempfile::tempdir().unwrap();
    let request = CheckRequest {
        manifests: vec![write(&dir, "app.yaml", SERVER_FORM)],
        declaration: declared(),
        ..CheckRequest::default()
    };

    let report = run_check(&request, None).await.unwrap();
    let r1: Vec<_> = report.violations.iter().filter(|v| v.rule == RuleId::R1).collect();
    assert_eq!(r1.len(), 1);
    assert_eq!(r1[0].severity, Severity::Critical);
    assert_eq!(r1[0].application.as_deref(), Some("guestbook"));
    assert_eq!(report.exit_code, EXIT_VIOLATIONS);
}

#[tokio::test]
async fn scenario_b_name_form_destination_passes() {
    let dir = tempfile::tempdir().unwrap();
    let request = CheckRequest {
        manifests: vec![write(&dir, "app.yaml", NAME_FORM)],
        declaration: declared(),
        ..CheckRequest::default()
    };

    let report = run_check(&request, None).await.unwrap();
    assert!(report.violations.is_empty(), "{:?}", report.violations);
    assert_eq!(report.exit_code, EXIT_OK);
}

#[tokio::test]
async fn scenario_c_create_namespace_without_spoke() {
    let dir = tempfile::tempdir().unwrap();
    let request = CheckRequest {
        manifests: vec![write(&dir, "app.yaml", NAME_FORM)],
        declaration: TopologyDeclaration::new("argocd-usw2", ""),
        ..CheckRequest::default()
    };

    let report = run_check(&request, None).await.unwrap();
    assert!(report
        .violations
        .iter()
        .any(|v| v.rule == RuleId::R2 && v.severity == Severity::Error));
    assert_eq!(report.exit_code, EXIT_VIOLATIONS);
}

#[tokio::test]
async fn multiple_files_keep_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let second = SERVER_FORM.replace(
        "name: guestbook\n  namespace: argocd",
        "name: billing\n  namespace: argocd",
    );
    let request = CheckRequest {
        manifests: vec![write(&dir, "a.yaml", SERVER_FORM), write(&dir, "b.yaml", &second)],
        declaration: declared(),
        ..CheckRequest::default()
    };

    let report = run_check(&request, None).await.unwrap();
    assert_eq!(report.applications, vec!["guestbook".to_string(), "billing".to_string()]);
    let apps: Vec<_> = report
        .violations
        .iter()
        .filter(|v| v.rule == RuleId::R1)
        .map(|v| v.application.clone().unwrap_or_default())
        .collect();
    assert_eq!(apps, vec!["guestbook", "billing"]);
}

#[tokio::test]
async fn workflow_file_drives_spoke_step_rule() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = write(
        &dir,
        "deploy.yaml",
        r#"
jobs:
  deploy:
    steps:
      - name: Sync
        run: argocd app sync guestbook
      - name: Endpoint
        run: kubectl get svc guestbook -o jsonpath='{.status.loadBalancer.ingress[0].hostname}'
"#,
    );
    let request = CheckRequest {
        manifests: vec![write(&dir, "app.yaml", NAME_FORM)],
        declaration: TopologyDeclaration::new("argocd-usw2", ""),
        workflow: Some(workflow),
        deadline: None,
    };

    let report = run_check(&request, None).await.unwrap();
    let r3: Vec<_> = report.violations.iter().filter(|v| v.rule == RuleId::R3).collect();
    assert_eq!(r3.len(), 1);
    assert!(r3[0].application.is_none());
}

#[tokio::test]
async fn idempotent_output() {
    let dir = tempfile::tempdir().unwrap();
    let request = CheckRequest {
        manifests: vec![write(&dir, "app.yaml", SERVER_FORM)],
        declaration: TopologyDeclaration::new("argocd-usw2", ""),
        ..CheckRequest::default()
    };

    let first = run_check(&request, None).await.unwrap();
    let second = run_check(&request, None).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first.violations).unwrap(),
        serde_json::to_string(&second.violations).unwrap()
    );
}

#[tokio::test]
async fn malformed_manifest_is_a_tool_error() {
    let dir = tempfile::tempdir().unwrap();
    let both = SERVER_FORM.replace(
        "server: https://kubernetes.default.svc",
        "server: https://kubernetes.default.svc\n    name: opsera-usw2-np",
    );
    let request = CheckRequest {
        manifests: vec![write(&dir, "app.yaml", &both)],
        declaration: declared(),
        ..CheckRequest::default()
    };

    let err = run_check(&request, None).await.unwrap_err();
    assert!(matches!(err, CheckError::MalformedManifest { .. }));
    assert_eq!(err.component(), "manifest-parser");
}

#[tokio::test]
async fn missing_file_is_an_input_error() {
    let request = CheckRequest {
        manifests: vec![PathBuf::from("/nonexistent/app.yaml")],
        declaration: declared(),
        ..CheckRequest::default()
    };

    let err = run_check(&request, None).await.unwrap_err();
    assert!(matches!(err, CheckError::Io { .. }));
}

#[tokio::test]
async fn report_serializes_verdict_only_when_probed() {
    let dir = tempfile::tempdir().unwrap();
    let request = CheckRequest {
        manifests: vec![write(&dir, "app.yaml", NAME_FORM)],
        declaration: declared(),
        deadline: Some(Duration::from_secs(1)),
        ..CheckRequest::default()
    };

    let report = run_check(&request, None).await.unwrap();
    assert_eq!(report.verdict, None::<ProbeVerdict>);
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert!(json.get("verdict").is_none());
    assert_eq!(json["topology"]["spoke"], "opsera-usw2-np");
}
