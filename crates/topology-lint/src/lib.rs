//! Hub-spoke topology checks for ArgoCD deployments.
//!
//! Reads ArgoCD `Application` manifests, evaluates them against a declared
//! hub/spoke cluster pair, optionally asks the controller whether the spoke
//! is registered and reachable, and produces a report with remediation.
//!
//! # Example
//!
//! ```ignore
//! use topology_lint::{check, TopologyDeclaration};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let request = check::CheckRequest {
//!         manifests: vec!["app.yaml".into()],
//!         declaration: TopologyDeclaration::new("argocd-usw2", "opsera-usw2-np"),
//!         ..Default::default()
//!     };
//!     let report = check::run_check(&request, None).await?;
//!     print!("{}", report.render_text());
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod check;
pub mod config;
pub mod error;
pub mod manifest;
pub mod probe;
pub mod remediation;
pub mod report;
pub mod retry;
pub mod rules;
pub mod topology;
pub mod ui;
pub mod workflow;

pub use error::{CheckError, RegistryError};
pub use manifest::{ApplicationManifest, ClusterRef};
pub use probe::{ClusterRegistry, ConnectivityProber, ProbeVerdict};
pub use report::CheckReport;
pub use rules::{RuleId, RuleViolation, Severity};
pub use topology::TopologyDeclaration;
