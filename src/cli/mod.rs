//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    config::ConfigArgs, domain::DomainArgs, init::InitArgs, job::JobArgs, profile::ProfileArgs,
    task::TaskArgs, worker::WorkerArgs,
};

#[derive(Parser, Debug)]
#[command(name = "autoapply")]
#[command(about = "Rate-limited, audited job applications against ATS forms", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .autoapply/
    #[arg(long, global = true, env = "AUTOAPPLY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .autoapply/ with a default config and database
    Init(InitArgs),
    /// Application task commands
    Task(TaskArgs),
    /// Run the scheduler and agents against queued tasks
    Worker(WorkerArgs),
    /// Inspect per-host admission policies
    Domain(DomainArgs),
    /// Inspect configuration
    Config(ConfigArgs),
    /// Manage the job catalog
    Job(JobArgs),
    /// Manage candidate profiles
    Profile(ProfileArgs),
}

/// Print `err` with its cause chain and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({ "error": err.to_string(), "causes": causes });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}
