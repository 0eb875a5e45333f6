//! Topology rule engine.
//!
//! Rules are pure functions of the parsed applications, the declared
//! topology and the workflow steps. Every rule runs; violations come out in
//! rule order (R1..R5), then input order within a rule.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::manifest::{ApplicationManifest, ClusterRef, RetryPolicy};
use crate::remediation;
use crate::topology::TopologyDeclaration;
use crate::workflow::WorkflowStep;

/// Violation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Whether this severity fails the check.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Rule identifiers, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleId {
    R1,
    R2,
    R3,
    R4,
    R5,
}

impl RuleId {
    pub const ALL: [Self; 5] = [Self::R1, Self::R2, Self::R3, Self::R4, Self::R5];

    /// Short machine-friendly name.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::R1 => "destination-by-name",
            Self::R2 => "create-namespace-needs-spoke",
            Self::R3 => "spoke-declaration-missing",
            Self::R4 => "retry-unbounded",
            Self::R5 => "hub-spoke-distinct",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::R1 => {
                "Destination must reference the declared spoke by name, \
                 not the in-cluster server URL"
            }
            Self::R2 => "CreateNamespace=true requires a declared spoke cluster",
            Self::R3 => "Spoke-only workflow steps require a declared spoke cluster",
            Self::R4 => "Sync retry backoff must have a bounded maximum duration",
            Self::R5 => "Hub and spoke identifiers must name different clusters",
        }
    }

    /// Highest severity the rule can emit.
    #[must_use]
    pub fn max_severity(self) -> Severity {
        match self {
            Self::R1 => Severity::Critical,
            Self::R2 | Self::R3 | Self::R5 => Severity::Error,
            Self::R4 => Severity::Warning,
        }
    }

    /// Rules that depend on the declaration alone and fire at most once per run.
    fn is_declaration_scoped(self) -> bool {
        matches!(self, Self::R3 | Self::R5)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single rule finding. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule: RuleId,
    pub severity: Severity,
    /// Application the finding belongs to; `None` for declaration-level rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    pub message: String,
    pub remediation: String,
}

impl RuleViolation {
    fn new(rule: RuleId, severity: Severity, application: Option<&str>, message: String) -> Self {
        Self {
            rule,
            severity,
            application: application.map(ToString::to_string),
            message,
            remediation: remediation::for_rule(rule).summary.to_string(),
        }
    }
}

/// Evaluate every rule against a single application.
#[must_use]
pub fn evaluate(
    manifest: &ApplicationManifest,
    declaration: &TopologyDeclaration,
    steps: &[WorkflowStep],
) -> Vec<RuleViolation> {
    evaluate_all(std::slice::from_ref(manifest), declaration, steps)
}

/// Evaluate every rule against a set of applications.
///
/// Declaration-level rules (R3, R5) are reported once, not per application.
#[must_use]
pub fn evaluate_all(
    manifests: &[ApplicationManifest],
    declaration: &TopologyDeclaration,
    steps: &[WorkflowStep],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();

    for rule in RuleId::ALL {
        if rule.is_declaration_scoped() {
            violations.extend(check_declaration(rule, declaration, steps));
            continue;
        }
        for manifest in manifests {
            violations.extend(check_manifest(rule, manifest, declaration));
        }
    }

    violations
}

fn check_manifest(
    rule: RuleId,
    manifest: &ApplicationManifest,
    declaration: &TopologyDeclaration,
) -> Option<RuleViolation> {
    match rule {
        RuleId::R1 => check_destination(manifest, declaration),
        RuleId::R2 => check_create_namespace(manifest, declaration),
        RuleId::R4 => check_retry(manifest),
        RuleId::R3 | RuleId::R5 => None,
    }
}

fn check_declaration(
    rule: RuleId,
    declaration: &TopologyDeclaration,
    steps: &[WorkflowStep],
) -> Vec<RuleViolation> {
    match rule {
        RuleId::R3 => check_spoke_steps(declaration, steps),
        RuleId::R5 => check_distinct(declaration).into_iter().collect(),
        RuleId::R1 | RuleId::R2 | RuleId::R4 => Vec::new(),
    }
}

/// R1: the destination must name the declared spoke.
fn check_destination(
    manifest: &ApplicationManifest,
    declaration: &TopologyDeclaration,
) -> Option<RuleViolation> {
    if !declaration.has_spoke() {
        return None;
    }

    let cluster = &manifest.destination.cluster;
    if cluster.name() == Some(declaration.spoke.as_str()) {
        return None;
    }

    let (severity, message) = if cluster.is_in_cluster() {
        (
            Severity::Critical,
            format!(
                "destination `{cluster}` is the in-cluster endpoint; the application will deploy \
                 to the hub instead of spoke '{}'",
                declaration.spoke
            ),
        )
    } else {
        match cluster {
            ClusterRef::Server(url) => (
                Severity::Error,
                format!(
                    "destination uses server URL '{url}'; reference spoke '{}' by name",
                    declaration.spoke
                ),
            ),
            ClusterRef::Name(name) => (
                Severity::Error,
                format!(
                    "destination name '{name}' does not match declared spoke '{}'",
                    declaration.spoke
                ),
            ),
        }
    };

    Some(RuleViolation::new(RuleId::R1, severity, Some(manifest.name.as_str()), message))
}

/// R2: namespace creation needs a spoke to create it on.
fn check_create_namespace(
    manifest: &ApplicationManifest,
    declaration: &TopologyDeclaration,
) -> Option<RuleViolation> {
    if !manifest.sync_policy.create_namespace || declaration.has_spoke() {
        return None;
    }

    Some(RuleViolation::new(
        RuleId::R2,
        Severity::Error,
        Some(manifest.name.as_str()),
        "syncOptions requests CreateNamespace=true but no spoke cluster is declared".to_string(),
    ))
}

/// R3: spoke-only steps need a declared spoke.
fn check_spoke_steps(
    declaration: &TopologyDeclaration,
    steps: &[WorkflowStep],
) -> Vec<RuleViolation> {
    if declaration.has_spoke() {
        return Vec::new();
    }

    steps
        .iter()
        .filter(|step| step.is_spoke_only())
        .map(|step| {
            RuleViolation::new(
                RuleId::R3,
                Severity::Error,
                None,
                format!(
                    "step '{}' runs a spoke-only operation but SPOKE_CLUSTER is not declared",
                    step.name
                ),
            )
        })
        .collect()
}

/// R4: retries must be bounded.
fn check_retry(manifest: &ApplicationManifest) -> Option<RuleViolation> {
    let retry = manifest.sync_policy.retry.as_ref()?;
    let gaps = retry_gaps(retry);
    if gaps.is_empty() {
        return None;
    }

    Some(RuleViolation::new(
        RuleId::R4,
        Severity::Warning,
        Some(manifest.name.as_str()),
        format!("retry policy is unbounded: {}", gaps.join("; ")),
    ))
}

fn retry_gaps(retry: &RetryPolicy) -> Vec<String> {
    let mut gaps = Vec::new();

    if let Some(limit) = retry.limit {
        if limit < 0 {
            gaps.push(format!("limit {limit} retries forever"));
        }
    }

    match retry.backoff.as_ref().and_then(|b| b.max_duration.as_deref()) {
        None => gaps.push("backoff.maxDuration is not set".to_string()),
        Some(raw) => match parse_duration(raw) {
            Some(d) if !d.is_zero() => {}
            Some(_) => gaps.push("backoff.maxDuration is zero".to_string()),
            None => gaps.push(format!("backoff.maxDuration '{raw}' is not a valid duration")),
        },
    }

    gaps
}

/// R5: the spoke must not be the hub.
fn check_distinct(declaration: &TopologyDeclaration) -> Option<RuleViolation> {
    if !declaration.is_complete() || declaration.hub != declaration.spoke {
        return None;
    }

    Some(RuleViolation::new(
        RuleId::R5,
        Severity::Error,
        None,
        format!(
            "hub and spoke are both '{}'; the spoke must be a cluster distinct from the hub",
            declaration.hub
        ),
    ))
}

/// Parse a Go-style duration such as `5s`, `1.5m`, `1h30m`, `300us` or `500ms`.
///
/// A bare integer is taken as seconds. Negative or overflowing values are
/// rejected.
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut rest = raw.strip_prefix('+').unwrap_or(raw);
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos: u64 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale: u64 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return None,
        };

        let whole: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut nanos = whole.checked_mul(scale)?;

        if !frac_part.is_empty() {
            // Digits past nanosecond precision cannot change the result.
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u64 = digits.parse().ok()?;
            let denominator = 10_u64.checked_pow(u32::try_from(digits.len()).ok()?)?;
            let frac_nanos = u128::from(numerator) * u128::from(scale) / u128::from(denominator);
            nanos = nanos.checked_add(u64::try_from(frac_nanos).ok()?)?;
        }

        total_nanos = total_nanos.checked_add(nanos)?;
    }

    Some(Duration::from_nanos(total_nanos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Destination, RetryBackoff, Source, SyncPolicy};

    fn app(cluster: ClusterRef) -> ApplicationManifest {
        ApplicationManifest {
            name: "web".into(),
            namespace: "argocd".into(),
            project: "default".into(),
            sources: vec![Source {
                repo_url: "https://github.com/acme/apps".into(),
                path: Some("web".into()),
                chart: None,
                target_revision: "main".into(),
            }],
            destination: Destination {
                cluster,
                namespace: Some("web".into()),
            },
            sync_policy: SyncPolicy::default(),
        }
    }

    fn decl() -> TopologyDeclaration {
        TopologyDeclaration::new("argocd-usw2", "opsera-usw2-np")
    }

    fn rules_of(violations: &[RuleViolation]) -> Vec<RuleId> {
        violations.iter().map(|v| v.rule).collect()
    }

    #[test]
    fn test_name_destination_passes() {
        let violations = evaluate(&app(ClusterRef::Name("opsera-usw2-np".into())), &decl(), &[]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_in_cluster_destination_is_critical() {
        let violations = evaluate(
            &app(ClusterRef::Server("https://kubernetes.default.svc".into())),
            &decl(),
            &[],
        );
        assert_eq!(rules_of(&violations), vec![RuleId::R1]);
        assert_eq!(violations[0].severity, Severity::Critical);
        assert_eq!(violations[0].application.as_deref(), Some("web"));
        assert!(violations[0].remediation.contains("Use cluster NAME, not server URL"));
    }

    #[test]
    fn test_other_destinations_are_errors() {
        let wrong_name = evaluate(&app(ClusterRef::Name("other".into())), &decl(), &[]);
        assert_eq!(wrong_name.len(), 1);
        assert_eq!(wrong_name[0].severity, Severity::Error);

        let external = evaluate(
            &app(ClusterRef::Server("https://10.0.0.1:6443".into())),
            &decl(),
            &[],
        );
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].severity, Severity::Error);
    }

    #[test]
    fn test_r1_skipped_without_spoke() {
        let decl = TopologyDeclaration::new("argocd-usw2", "");
        let violations = evaluate(
            &app(ClusterRef::Server("https://kubernetes.default.svc".into())),
            &decl,
            &[],
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_create_namespace_without_spoke() {
        let mut manifest = app(ClusterRef::Name("opsera-usw2-np".into()));
        manifest.sync_policy.create_namespace = true;

        let violations = evaluate(&manifest, &TopologyDeclaration::new("argocd-usw2", ""), &[]);
        assert_eq!(rules_of(&violations), vec![RuleId::R2]);

        assert!(evaluate(&manifest, &decl(), &[]).is_empty());
    }

    #[test]
    fn test_spoke_steps_reported_in_order() {
        let steps = vec![
            WorkflowStep::new("lookup", "kubectl get ingress -A"),
            WorkflowStep::new("noop", "echo hi"),
            WorkflowStep::new(
                "lb",
                "kubectl get svc web -o jsonpath='{.status.loadBalancer.ingress[0].hostname}'",
            ),
        ];
        let decl = TopologyDeclaration::new("argocd-usw2", "");
        let violations = evaluate(&app(ClusterRef::Name("x".into())), &decl, &steps);

        assert_eq!(rules_of(&violations), vec![RuleId::R3, RuleId::R3]);
        assert!(violations[0].message.contains("'lookup'"));
        assert!(violations[1].message.contains("'lb'"));
        assert!(violations[0].application.is_none());
    }

    #[test]
    fn test_retry_without_cap_is_warning() {
        let mut manifest = app(ClusterRef::Name("opsera-usw2-np".into()));
        manifest.sync_policy.retry = Some(RetryPolicy {
            limit: Some(-1),
            backoff: Some(RetryBackoff {
                duration: Some("5s".into()),
                factor: Some(2),
                max_duration: None,
            }),
        });

        let violations = evaluate(&manifest, &decl(), &[]);
        assert_eq!(rules_of(&violations), vec![RuleId::R4]);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("limit -1"));
        assert!(violations[0].message.contains("maxDuration is not set"));

        manifest.sync_policy.retry = Some(RetryPolicy {
            limit: Some(5),
            backoff: Some(RetryBackoff {
                max_duration: Some("3m".into()),
                ..RetryBackoff::default()
            }),
        });
        assert!(evaluate(&manifest, &decl(), &[]).is_empty());
    }

    #[test]
    fn test_hub_equals_spoke() {
        let decl = TopologyDeclaration::new("argocd-usw2", "argocd-usw2");
        let violations = evaluate(&app(ClusterRef::Name("argocd-usw2".into())), &decl, &[]);
        assert_eq!(rules_of(&violations), vec![RuleId::R5]);
    }

    #[test]
    fn test_rule_order_across_applications() {
        let mut first = app(ClusterRef::Server("https://kubernetes.default.svc".into()));
        first.name = "first".into();
        first.sync_policy.retry = Some(RetryPolicy::default());
        let mut second = app(ClusterRef::Name("wrong".into()));
        second.name = "second".into();

        let violations = evaluate_all(&[first, second], &decl(), &[]);
        assert_eq!(rules_of(&violations), vec![RuleId::R1, RuleId::R1, RuleId::R4]);
        assert_eq!(violations[0].application.as_deref(), Some("first"));
        assert_eq!(violations[1].application.as_deref(), Some("second"));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let manifest = app(ClusterRef::Server("https://kubernetes.default.svc".into()));
        let a = serde_json::to_vec(&evaluate(&manifest, &decl(), &[])).unwrap();
        let b = serde_json::to_vec(&evaluate(&manifest, &decl(), &[])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("3m"), Some(Duration::from_secs(180)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1.5m"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration(".5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("300us"), Some(Duration::from_micros(300)));
        assert_eq!(parse_duration("300µs"), Some(Duration::from_micros(300)));
        assert_eq!(parse_duration("250ns"), Some(Duration::from_nanos(250)));
        assert_eq!(parse_duration("+2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("1.s"), Some(Duration::from_secs(1)));
        assert_eq!(parse_duration("."), None);
        assert_eq!(parse_duration("5m3"), None);
        assert_eq!(parse_duration("forever"), None);
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_invalid() {
        assert_eq!(parse_duration("18446744073709551615s1s"), None);
        assert_eq!(parse_duration("9999999999999h"), None);
        assert_eq!(parse_duration("584y"), None);
    }

    #[test]
    fn test_overflowing_max_duration_is_flagged_not_fatal() {
        let mut manifest = app(ClusterRef::Name("opsera-usw2-np".into()));
        manifest.sync_policy.retry = Some(RetryPolicy {
            limit: Some(5),
            backoff: Some(RetryBackoff {
                duration: Some("5s".into()),
                factor: Some(2),
                max_duration: Some("18446744073709551615s1s".into()),
            }),
        });

        let violations = evaluate(&manifest, &decl(), &[]);
        assert_eq!(rules_of(&violations), vec![RuleId::R4]);
        assert!(violations[0].message.contains("is not a valid duration"));
    }

    #[test]
    fn test_fractional_max_duration_is_bounded() {
        let mut manifest = app(ClusterRef::Name("opsera-usw2-np".into()));
        manifest.sync_policy.retry = Some(RetryPolicy {
            limit: Some(5),
            backoff: Some(RetryBackoff {
                duration: Some("500ms".into()),
                factor: Some(2),
                max_duration: Some("1.5m".into()),
            }),
        });

        assert!(evaluate(&manifest, &decl(), &[]).is_empty());
    }
}
