//! Remediation catalog for hub-spoke anti-patterns.
//!
//! Each rule and each non-healthy probe verdict maps to a short fix and the
//! commands an operator would run to confirm it.

use crate::probe::ProbeVerdict;
use crate::rules::RuleId;

/// How to fix one anti-pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remediation {
    /// One-line fix, shown next to every violation.
    pub summary: &'static str,
    /// Commands to diagnose or apply the fix.
    pub steps: &'static [&'static str],
}

/// Remediation for a rule.
#[must_use]
pub fn for_rule(rule: RuleId) -> Remediation {
    match rule {
        RuleId::R1 => Remediation {
            summary: "Use cluster NAME, not server URL: set spec.destination.name to the spoke \
                      cluster name registered with ArgoCD",
            steps: &[
                "kubectl config use-context \"$HUB_CLUSTER\"",
                "argocd cluster list",
                "# in the Application: destination: { name: <spoke>, namespace: <ns> }",
            ],
        },
        RuleId::R2 => Remediation {
            summary: "Declare SPOKE_CLUSTER alongside HUB_CLUSTER; CreateNamespace must target \
                      the spoke, not the hub",
            steps: &[
                "export HUB_CLUSTER=<hub context>",
                "export SPOKE_CLUSTER=<spoke cluster name>",
            ],
        },
        RuleId::R3 => Remediation {
            summary: "Declare SPOKE_CLUSTER and run ingress/LoadBalancer lookups with \
                      --context \"$SPOKE_CLUSTER\"; those resources live on the spoke",
            steps: &[
                "export SPOKE_CLUSTER=<spoke cluster name>",
                "kubectl --context \"$SPOKE_CLUSTER\" get ingress -A",
            ],
        },
        RuleId::R4 => Remediation {
            summary: "Bound sync retries: set syncPolicy.retry.backoff.maxDuration (e.g. 3m) \
                      and a non-negative retry.limit",
            steps: &[
                "# retry: { limit: 5, backoff: { duration: 5s, factor: 2, maxDuration: 3m } }",
            ],
        },
        RuleId::R5 => Remediation {
            summary: "Point SPOKE_CLUSTER at the workload cluster; the hub only runs ArgoCD",
            steps: &["argocd cluster list", "kubectl config get-contexts"],
        },
    }
}

/// Remediation for a probe verdict, if the verdict needs one.
#[must_use]
pub fn for_verdict(verdict: ProbeVerdict) -> Option<Remediation> {
    match verdict {
        ProbeVerdict::Registered => None,
        ProbeVerdict::NotRegistered => Some(Remediation {
            summary: "Register the spoke with ArgoCD from the hub context",
            steps: &[
                "kubectl config use-context \"$HUB_CLUSTER\"",
                "argocd cluster add \"$SPOKE_CLUSTER\" --name \"$SPOKE_CLUSTER\"",
                "argocd cluster list",
            ],
        }),
        ProbeVerdict::Unreachable => Some(Remediation {
            summary: "ArgoCD cannot connect to the spoke; check its API endpoint, credentials \
                      and network path from the hub",
            steps: &[
                "argocd cluster get \"$SPOKE_CLUSTER\"",
                "kubectl --context \"$SPOKE_CLUSTER\" get nodes",
            ],
        }),
        ProbeVerdict::Unknown => Some(Remediation {
            summary: "Unknown sync status means a registration or reachability problem, not a \
                      sync conflict: verify the destination cluster name and registration",
            steps: &[
                "argocd cluster list",
                "kubectl -n argocd get application <app> -o jsonpath='{.spec.destination}'",
                "kubectl -n argocd annotate application <app> \
                 argocd.argoproj.io/refresh=hard --overwrite",
            ],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_rule_has_remediation() {
        for rule in RuleId::ALL {
            let remediation = for_rule(rule);
            assert!(!remediation.summary.is_empty());
            assert!(!remediation.steps.is_empty());
        }
    }

    #[test]
    fn test_destination_hint_mentions_name() {
        assert!(for_rule(RuleId::R1).summary.starts_with("Use cluster NAME, not server URL"));
    }

    #[test]
    fn test_registered_needs_no_remediation() {
        assert!(for_verdict(ProbeVerdict::Registered).is_none());
        assert!(for_verdict(ProbeVerdict::Unknown).is_some());
    }
}
