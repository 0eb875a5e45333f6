//! Rules command - print the rule catalog.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use topology_lint::remediation;
use topology_lint::{RuleId, Severity};

/// List every rule with its severity and remediation.
#[derive(Args)]
pub struct RulesCommand {
    /// Output the catalog as JSON.
    #[arg(long, default_value = "false")]
    json: bool,
}

#[derive(Serialize)]
struct RuleEntry {
    id: RuleId,
    slug: &'static str,
    severity: Severity,
    description: &'static str,
    remediation: &'static str,
    steps: &'static [&'static str],
}

fn catalog() -> Vec<RuleEntry> {
    RuleId::ALL
        .iter()
        .map(|&rule| {
            let fix = remediation::for_rule(rule);
            RuleEntry {
                id: rule,
                slug: rule.slug(),
                severity: rule.max_severity(),
                description: rule.description(),
                remediation: fix.summary,
                steps: fix.steps,
            }
        })
        .collect()
}

impl RulesCommand {
    /// Run the rules command.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be serialized.
    pub fn run(&self) -> Result<ExitCode> {
        let entries = catalog();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("Failed to serialize rule catalog")?
            );
            return Ok(ExitCode::SUCCESS);
        }

        for entry in &entries {
            println!(
                "{} {} {}",
                entry.id.to_string().cyan().bold(),
                entry.slug.bold(),
                format!("({})", entry.severity).bright_black()
            );
            println!("    {}", entry.description);
            println!("    {} {}", "→".cyan(), entry.remediation);
            for step in entry.steps {
                println!("      {}", step.bright_black());
            }
            println!();
        }
        Ok(ExitCode::SUCCESS)
    }
}
