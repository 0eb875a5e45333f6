//! Check command - lint manifests and probe the controller.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use tokio::time::Instant;
use tracing::{info, warn};

use topology_lint::check::{self, CheckRequest};
use topology_lint::config::{ControllerBackend, FileConfig};
use topology_lint::probe::{
    ArgoCdApiRegistry, ClusterRegistry, ConnectivityProber, KubeRegistry,
};
use topology_lint::report::EXIT_TOOL_ERROR;
use topology_lint::{CheckError, CheckReport, TopologyDeclaration};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored summary.
    Text,
    /// Uncolored text, one line per finding.
    Plain,
    Json,
}

/// Check Application manifests against the hub-spoke topology.
#[derive(Args)]
pub struct CheckCommand {
    /// Application manifest file (repeatable).
    #[arg(short = 'f', long = "manifest", required = true)]
    manifests: Vec<PathBuf>,

    /// Hub cluster identifier (the cluster running ArgoCD).
    #[arg(long, env = "HUB_CLUSTER")]
    hub: Option<String>,

    /// Spoke cluster identifier (the registered deployment target).
    #[arg(long, env = "SPOKE_CLUSTER")]
    spoke: Option<String>,

    /// Workflow step file to check for spoke-only commands.
    #[arg(long)]
    workflow: Option<PathBuf>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Overall deadline for connecting to and probing the controller, in seconds.
    #[arg(long)]
    deadline: Option<u64>,

    /// Config file (defaults to ./topology-lint.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller backend to probe through.
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// ArgoCD server URL for the api backend.
    #[arg(long, env = "ARGOCD_SERVER")]
    argocd_url: Option<String>,

    /// Skip the connectivity probe.
    #[arg(long, default_value = "false")]
    no_probe: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Api,
    Kube,
}

impl From<BackendArg> for ControllerBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Api => Self::Api,
            BackendArg::Kube => Self::Kube,
        }
    }
}

impl CheckCommand {
    /// Run the check command.
    ///
    /// # Errors
    ///
    /// Returns an error only if the report cannot be written; check failures
    /// map to exit codes.
    pub async fn run(&self) -> Result<ExitCode> {
        let config = match FileConfig::discover(self.config.as_deref()) {
            Ok(config) => config,
            Err(err) => return Ok(tool_error(&err)),
        };

        let mut request = self.request(&config);
        info!(
            topology = %request.declaration,
            manifests = request.manifests.len(),
            "Starting topology check"
        );

        // The deadline also bounds connecting to the hub.
        let deadline = request.deadline.map(|d| Instant::now() + d);
        let target = if request.declaration.has_spoke() {
            request.declaration.spoke.as_str()
        } else {
            "<controller>"
        };
        let setup = check::within_deadline(
            deadline,
            target,
            self.build_prober(&config, &request.declaration),
        );
        let (prober, setup_error) = match setup.await {
            Ok(prober) => (prober, None),
            Err(err) if err.is_recoverable() => {
                warn!(
                    error = %err,
                    component = err.component(),
                    "Could not connect to the controller"
                );
                (None, Some(err))
            }
            Err(err) => return Ok(tool_error(&err)),
        };
        request.deadline = deadline.map(|at| at.saturating_duration_since(Instant::now()));

        let mut report = match check::run_check(&request, prober.as_ref()).await {
            Ok(report) => report,
            Err(err) => return Ok(tool_error(&err)),
        };
        if let Some(err) = setup_error {
            report = check::degrade(report, &err);
        }

        self.emit(&report)?;
        Ok(ExitCode::from(report.exit_code))
    }

    /// Merge flags, environment and config file into a check request.
    fn request(&self, config: &FileConfig) -> CheckRequest {
        let hub = self.hub.clone().unwrap_or_else(|| config.topology.hub.clone());
        let spoke = self
            .spoke
            .clone()
            .unwrap_or_else(|| config.topology.spoke.clone());

        CheckRequest {
            manifests: self.manifests.clone(),
            declaration: TopologyDeclaration::new(hub, spoke),
            workflow: self.workflow.clone().or_else(|| config.workflow.clone()),
            deadline: self.deadline.map(Duration::from_secs),
        }
    }

    async fn build_prober(
        &self,
        config: &FileConfig,
        declaration: &TopologyDeclaration,
    ) -> Result<Option<ConnectivityProber>, CheckError> {
        if self.no_probe {
            return Ok(None);
        }

        let controller = &config.controller;
        let backend = self.backend.map_or(controller.backend, ControllerBackend::from);

        let registry: Box<dyn ClusterRegistry> = match backend {
            ControllerBackend::Api => {
                let Some(url) = self.argocd_url.clone().or_else(|| controller.url.clone()) else {
                    info!("No ArgoCD server URL configured, skipping connectivity probe");
                    return Ok(None);
                };
                let token = std::env::var(&controller.token_env)
                    .ok()
                    .filter(|t| !t.is_empty());
                if token.is_none() {
                    warn!(
                        env = %controller.token_env,
                        "No ArgoCD token set, calling the API anonymously"
                    );
                }
                Box::new(ArgoCdApiRegistry::new(
                    &url,
                    token,
                    config.probe.call_timeout(),
                    controller.insecure,
                )?)
            }
            ControllerBackend::Kube => {
                // The hub identifier doubles as its kubeconfig context.
                let context = controller
                    .context
                    .clone()
                    .or_else(|| declaration.has_hub().then(|| declaration.hub.clone()));
                Box::new(
                    KubeRegistry::from_kubeconfig(
                        controller.kubeconfig.as_deref(),
                        context.as_deref(),
                        &controller.namespace,
                    )
                    .await?,
                )
            }
        };

        info!(backend = %backend, "Connectivity probe enabled");
        Ok(Some(
            ConnectivityProber::new(registry)
                .with_backoff(config.probe.backoff())
                .with_call_timeout(config.probe.call_timeout()),
        ))
    }

    fn emit(&self, report: &CheckReport) -> Result<()> {
        match self.format {
            OutputFormat::Text => report.print_summary(),
            OutputFormat::Plain => print!("{}", report.render_text()),
            OutputFormat::Json => {
                println!("{}", report.to_json().context("Failed to serialize report")?);
            }
        }
        Ok(())
    }
}

/// Report an error that stopped the check and return the tool-error status.
fn tool_error(err: &CheckError) -> ExitCode {
    eprintln!(
        "{} {} {}",
        "✗".red().bold(),
        format!("[{}]", err.component()).bright_black(),
        err.to_string().red()
    );
    eprintln!("{} {}", "ℹ".blue().bold(), err.hint());
    ExitCode::from(EXIT_TOOL_ERROR)
}
