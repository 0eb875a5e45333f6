//! Workflow step loading.
//!
//! The step list is external input to the spoke-declaration rule. It can be
//! written as a plain list of commands, a list of `{name, run}` steps, or a
//! GitHub Actions style document with `jobs.<id>.steps`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;

use crate::error::CheckError;

/// Commands that only make sense against a spoke cluster.
static SPOKE_ONLY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\bget\s+(ing|ingress|ingresses)\b").unwrap(),
        Regex::new(r"(?i)loadBalancer\.ingress").unwrap(),
        Regex::new(r"(?i)\bget\s+(svc|service|services)\b.*(hostname|external-ip|loadbalancer)")
            .unwrap(),
        Regex::new(r"(?i)type\s*=\s*LoadBalancer").unwrap(),
        Regex::new(r"(?i)--context[=\s]+\S*spoke").unwrap(),
        Regex::new(r"\$\{?\{?\s*(env\.)?SPOKE_[A-Z_]*").unwrap(),
        Regex::new(r"(?i)argocd\s+cluster\s+add").unwrap(),
    ]
});

/// A single workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStep {
    pub name: String,
    pub command: String,
}

impl WorkflowStep {
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Whether the step targets the spoke cluster (ingress or LoadBalancer
    /// lookups, spoke contexts, cluster registration).
    #[must_use]
    pub fn is_spoke_only(&self) -> bool {
        SPOKE_ONLY_PATTERNS.iter().any(|re| re.is_match(&self.command))
    }
}

/// Read and parse a workflow step file.
pub fn load_steps(path: &Path) -> Result<Vec<WorkflowStep>, CheckError> {
    let text = std::fs::read_to_string(path).map_err(|source| CheckError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_steps(&text)
}

/// Parse workflow steps from YAML text.
pub fn parse_steps(text: &str) -> Result<Vec<WorkflowStep>, CheckError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| CheckError::MalformedWorkflow(e.to_string()))?;

    match &value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => Ok(steps_from_sequence(items, "")),
        Value::Mapping(map) => {
            if let Some(Value::Mapping(jobs)) = map.get("jobs") {
                let mut steps = Vec::new();
                for (job_id, job) in jobs {
                    let job_id = job_id.as_str().unwrap_or("job");
                    if let Some(Value::Sequence(items)) = job.get("steps") {
                        steps.extend(steps_from_sequence(items, &format!("{job_id}/")));
                    }
                }
                Ok(steps)
            } else if let Some(Value::Sequence(items)) = map.get("steps") {
                Ok(steps_from_sequence(items, ""))
            } else {
                Err(CheckError::MalformedWorkflow(
                    "expected a list of steps, a `steps:` key or a `jobs:` map".into(),
                ))
            }
        }
        _ => Err(CheckError::MalformedWorkflow(
            "expected a list of steps, a `steps:` key or a `jobs:` map".into(),
        )),
    }
}

fn steps_from_sequence(items: &[Value], prefix: &str) -> Vec<WorkflowStep> {
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let fallback = format!("{prefix}step {}", i + 1);
            match item {
                Value::String(command) => Some(WorkflowStep::new(fallback, command.clone())),
                Value::Mapping(map) => {
                    let name = map
                        .get("name")
                        .and_then(Value::as_str)
                        .map_or(fallback, |n| format!("{prefix}{n}"));
                    let command = map
                        .get("run")
                        .or_else(|| map.get("command"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Some(WorkflowStep::new(name, command))
                }
                _ => None,
            }
        })
        .collect()
}
