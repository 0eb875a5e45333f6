//! Check report assembly and rendering.

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;

use crate::probe::{ProbeOutcome, ProbeVerdict};
use crate::remediation;
use crate::rules::{RuleId, RuleViolation, Severity};
use crate::topology::TopologyDeclaration;
use crate::ui;

/// Exit status when no ERROR or CRITICAL violation was found.
pub const EXIT_OK: u8 = 0;
/// Exit status when at least one ERROR or CRITICAL violation was found.
pub const EXIT_VIOLATIONS: u8 = 1;
/// Exit status when the check could not run.
pub const EXIT_TOOL_ERROR: u8 = 2;

/// The complete result of a check run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub topology: TopologyDeclaration,
    pub applications: Vec<String>,
    pub timestamp: String,
    pub violations: Vec<RuleViolation>,
    /// Probe verdict, when a probe ran or timed out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ProbeVerdict>,
    /// Probe details, when the controller answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeOutcome>,
    /// Some checks were skipped or degraded.
    pub partial: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub exit_code: u8,
}

impl CheckReport {
    #[must_use]
    pub fn new(
        topology: TopologyDeclaration,
        applications: Vec<String>,
        violations: Vec<RuleViolation>,
    ) -> Self {
        let mut report = Self {
            topology,
            applications,
            timestamp: chrono::Utc::now().to_rfc3339(),
            violations,
            verdict: None,
            probe: None,
            partial: false,
            notes: Vec::new(),
            exit_code: EXIT_OK,
        };
        report.exit_code = report.compute_exit_code();
        report
    }

    /// Attach a completed probe.
    #[must_use]
    pub fn with_probe(mut self, outcome: ProbeOutcome) -> Self {
        self.verdict = Some(outcome.verdict);
        for app in &outcome.missing_applications {
            self.notes
                .push(format!("application '{app}' is not known to the controller"));
        }
        self.probe = Some(outcome);
        self
    }

    /// Record a verdict without probe details (e.g. after a timeout).
    #[must_use]
    pub fn with_verdict(mut self, verdict: ProbeVerdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    /// Mark the report partial and explain why.
    #[must_use]
    pub fn partial(mut self, note: impl Into<String>) -> Self {
        self.partial = true;
        self.notes.push(note.into());
        self
    }

    /// Drop connectivity-dependent findings after the controller could not be
    /// queried, and mark the report partial.
    #[must_use]
    pub fn controller_unavailable(mut self, note: impl Into<String>) -> Self {
        let before = self.violations.len();
        self.violations.retain(|v| v.rule != RuleId::R3);
        let suppressed = before - self.violations.len();
        self.exit_code = self.compute_exit_code();

        self = self.partial(note);
        if suppressed > 0 {
            self.notes.push(format!(
                "{suppressed} {} finding(s) suppressed while the controller is unavailable",
                RuleId::R3
            ));
        }
        self
    }

    /// No ERROR or CRITICAL violation.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.violations.iter().any(|v| v.severity.is_failure())
    }

    fn compute_exit_code(&self) -> u8 {
        if self.passed() {
            EXIT_OK
        } else {
            EXIT_VIOLATIONS
        }
    }

    /// Number of violations at the given severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering, one block per violation.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Topology: {}", self.topology);
        let _ = writeln!(out, "Applications: {}", self.applications.join(", "));

        if self.violations.is_empty() {
            let _ = writeln!(out, "No violations.");
        }
        for v in &self.violations {
            let app = v
                .application
                .as_deref()
                .map(|a| format!(" [{a}]"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{} {} {}{}: {}",
                v.severity,
                v.rule,
                v.rule.slug(),
                app,
                v.message
            );
            let _ = writeln!(out, "    fix: {}", v.remediation);
        }

        if let Some(verdict) = self.verdict {
            let _ = writeln!(out, "Connectivity: {verdict}");
            if let Some(remediation) = remediation::for_verdict(verdict) {
                let _ = writeln!(out, "    fix: {}", remediation.summary);
                for step in remediation.steps {
                    let _ = writeln!(out, "      $ {step}");
                }
            }
        }

        for note in &self.notes {
            let _ = writeln!(out, "note: {note}");
        }
        if self.partial {
            let _ = writeln!(out, "Report is PARTIAL.");
        }

        let _ = writeln!(
            out,
            "Result: {} ({} critical, {} error, {} warning)",
            if self.passed() { "PASS" } else { "FAIL" },
            self.count(Severity::Critical),
            self.count(Severity::Error),
            self.count(Severity::Warning),
        );
        out
    }

    /// Print a colored summary to stdout.
    pub fn print_summary(&self) {
        ui::print_section("Hub-Spoke Topology Check");
        ui::print_kv("Topology", &self.topology.to_string());
        ui::print_kv("Applications", &self.applications.join(", "));
        println!();

        if self.violations.is_empty() {
            ui::print_success("No rule violations");
        }
        for v in &self.violations {
            let label = format!("{:<8}", v.severity.to_string());
            let label = match v.severity {
                Severity::Critical => label.red().bold(),
                Severity::Error => label.red(),
                Severity::Warning => label.yellow(),
                Severity::Info => label.blue(),
            };
            let app = v
                .application
                .as_deref()
                .map(|a| format!(" [{a}]"))
                .unwrap_or_default();
            println!(
                "  {label} {} {}{}",
                v.rule.to_string().bold(),
                v.rule.slug(),
                app.bright_black()
            );
            println!("           {}", v.message);
            println!("           {} {}", "→".cyan(), v.remediation.bright_black());
        }

        if let Some(verdict) = self.verdict {
            println!();
            match verdict {
                ProbeVerdict::Registered => ui::print_success("Spoke registered with ArgoCD"),
                other => ui::print_warning(&format!("Connectivity verdict: {other}")),
            }
            if let Some(probe) = &self.probe {
                for app in &probe.applications {
                    let detail = format!("sync {}, health {}", app.sync_status, app.health_status);
                    ui::print_check_result(&app.name, app.sync_status != "Unknown", Some(&detail));
                }
            }
            if let Some(remediation) = remediation::for_verdict(verdict) {
                ui::print_info(remediation.summary);
                for step in remediation.steps {
                    ui::print_list_item(step);
                }
            }
        }

        for note in &self.notes {
            ui::print_info(note);
        }
        if self.partial {
            ui::print_warning("Report is partial; some checks were skipped");
        }

        println!();
        let totals = format!(
            "{} critical, {} error, {} warning",
            self.count(Severity::Critical),
            self.count(Severity::Error),
            self.count(Severity::Warning)
        );
        if self.passed() {
            ui::print_success(&format!("Topology check passed ({totals})"));
        } else {
            ui::print_error(&format!("Topology check failed ({totals})"));
        }
    }
}
