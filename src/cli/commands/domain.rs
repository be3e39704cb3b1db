//! Domain admission CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{list_table, output, render_list, CommandOutput};
use crate::domain::models::{Config, Domain, RateLimitPolicy};
use crate::services::DomainAdmissionController;

#[derive(Args, Debug)]
pub struct DomainArgs {
    #[command(subcommand)]
    pub command: DomainCommands,
}

#[derive(Subcommand, Debug)]
pub enum DomainCommands {
    /// List hosts with a configured admission policy
    List,
}

#[derive(Debug, Serialize)]
pub struct DomainListOutput {
    pub default_policy: RateLimitPolicy,
    pub mode: String,
    pub domains: Vec<Domain>,
}

impl CommandOutput for DomainListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["host", "status", "requests/min", "max concurrent"]);
        for domain in &self.domains {
            table.add_row(vec![
                domain.host.clone(),
                domain.last_status.as_str().to_string(),
                domain.rate_limit_policy.requests_per_minute.to_string(),
                domain.rate_limit_policy.max_concurrent.to_string(),
            ]);
        }
        format!(
            "Default policy: {} requests/min, {} concurrent ({} mode)\n\n{}",
            self.default_policy.requests_per_minute,
            self.default_policy.max_concurrent,
            self.mode,
            render_list("domain", &table, self.domains.len())
        )
    }
}

pub fn list_domains(config: &Config) -> DomainListOutput {
    let controller = DomainAdmissionController::from_config(&config.admission);
    DomainListOutput {
        default_policy: config.admission.default_policy,
        mode: format!("{:?}", config.admission.mode).to_lowercase(),
        domains: controller.snapshot(),
    }
}

pub async fn execute(args: DomainArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        DomainCommands::List => output(&list_domains(config), json_mode),
    }
    Ok(())
}
