//! The check pipeline: parse, evaluate rules, probe, report.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::CheckError;
use crate::manifest::{self, ApplicationManifest};
use crate::probe::{AppRef, ConnectivityProber, ProbeVerdict};
use crate::report::CheckReport;
use crate::rules;
use crate::topology::TopologyDeclaration;
use crate::workflow::{self, WorkflowStep};

/// Inputs for one check run.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    /// Application manifest files.
    pub manifests: Vec<PathBuf>,
    pub declaration: TopologyDeclaration,
    /// Optional workflow step file.
    pub workflow: Option<PathBuf>,
    /// Overall deadline for the connectivity probe.
    pub deadline: Option<Duration>,
}

/// Load every input file and run the check.
///
/// A malformed manifest or workflow aborts the run; controller problems only
/// degrade the report.
pub async fn run_check(
    request: &CheckRequest,
    prober: Option<&ConnectivityProber>,
) -> Result<CheckReport, CheckError> {
    let mut manifests = Vec::new();
    for path in &request.manifests {
        manifests.extend(manifest::load_manifests(path)?);
    }

    let steps = match &request.workflow {
        Some(path) => workflow::load_steps(path)?,
        None => Vec::new(),
    };

    check_manifests(&manifests, &request.declaration, &steps, prober, request.deadline).await
}

/// Run the check on already-parsed inputs.
pub async fn check_manifests(
    manifests: &[ApplicationManifest],
    declaration: &TopologyDeclaration,
    steps: &[WorkflowStep],
    prober: Option<&ConnectivityProber>,
    deadline: Option<Duration>,
) -> Result<CheckReport, CheckError> {
    info!(
        applications = manifests.len(),
        steps = steps.len(),
        topology = %declaration,
        "Evaluating topology rules"
    );
    let violations = rules::evaluate_all(manifests, declaration, steps);
    let names: Vec<String> = manifests.iter().map(|m| m.name.clone()).collect();
    let mut report = CheckReport::new(declaration.clone(), names, violations);

    let Some(prober) = prober else {
        return Ok(report);
    };
    let deadline = deadline.map(|d| Instant::now() + d);

    if !declaration.has_spoke() {
        // Nothing to look up, but spoke-step findings still depend on the
        // controller being reachable.
        info!("No spoke declared, only checking controller availability");
        return match prober.ping(deadline).await {
            Ok(_) => {
                report
                    .notes
                    .push("connectivity probe skipped: no spoke cluster declared".to_string());
                Ok(report)
            }
            Err(err) if err.is_recoverable() => Ok(degrade(report, &err)),
            Err(err) => Err(err),
        };
    }

    let apps: Vec<AppRef> = manifests
        .iter()
        .map(|m| AppRef {
            name: m.name.clone(),
            namespace: m.namespace.clone(),
        })
        .collect();

    match prober.probe(&declaration.spoke, &apps, deadline).await {
        Ok(outcome) => {
            info!(verdict = %outcome.verdict, "Connectivity probe finished");
            Ok(report.with_probe(outcome))
        }
        Err(err) if err.is_recoverable() => Ok(degrade(report, &err)),
        Err(err) => Err(err),
    }
}

/// Mark a report partial after a recoverable controller error.
///
/// A timeout sets the verdict to `Unknown`; an unavailable controller
/// drops connectivity-dependent findings instead.
#[must_use]
pub fn degrade(report: CheckReport, err: &CheckError) -> CheckReport {
    let note = format!("{err}; {}", err.hint());

    if let CheckError::ProbeTimeout { .. } = err {
        warn!(error = %err, component = err.component(), "Probe timed out, verdict is Unknown");
        return report.with_verdict(ProbeVerdict::Unknown).partial(note);
    }

    warn!(
        error = %err,
        component = err.component(),
        "Controller unavailable, skipping connectivity-dependent checks"
    );
    report.controller_unavailable(note)
}

/// Await `fut` but give up at `deadline`, reporting a probe timeout for
/// `cluster` with no completed attempts.
///
/// # Errors
///
/// Returns the future's own error, or [`CheckError::ProbeTimeout`] when the
/// deadline passes first.
pub async fn within_deadline<T, F>(
    deadline: Option<Instant>,
    cluster: &str,
    fut: F,
) -> Result<T, CheckError>
where
    F: Future<Output = Result<T, CheckError>>,
{
    let Some(at) = deadline else {
        return fut.await;
    };
    tokio::time::timeout_at(at, fut).await.unwrap_or_else(|_| {
        Err(CheckError::ProbeTimeout {
            cluster: cluster.to_string(),
            attempts: 0,
        })
    })
}
