//! Job catalog CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{host_of, Config, Job, JobSource};

#[derive(Args, Debug)]
pub struct JobArgs {
    #[command(subcommand)]
    pub command: JobCommands,
}

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Add or replace a job in the catalog
    Add {
        /// ATS vendor (greenhouse, lever, or any other tag)
        #[arg(short, long)]
        source: String,
        /// Application form URL
        #[arg(short, long)]
        url: String,
        #[arg(short, long, default_value = "")]
        title: String,
        #[arg(short, long, default_value = "")]
        company: String,
        /// Reuse an existing job ID instead of generating one
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// List jobs in the catalog
    List,
}

#[derive(Debug, Serialize)]
pub struct JobOutput {
    pub id: String,
    pub source: String,
    pub apply_url: String,
    pub host: Option<String>,
    pub title: String,
    pub company: String,
}

impl From<&Job> for JobOutput {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            source: job.source.as_str().to_string(),
            apply_url: job.apply_url.clone(),
            host: job.apply_host(),
            title: job.title.clone(),
            company: job.company.clone(),
        }
    }
}

impl CommandOutput for JobOutput {
    fn to_human(&self) -> String {
        format!(
            "Job saved:\n  ID:      {}\n  Source:  {}\n  URL:     {}\n  Title:   {}\n  Company: {}",
            self.id, self.source, self.apply_url, self.title, self.company
        )
    }
}

#[derive(Debug, Serialize)]
pub struct JobListOutput {
    pub jobs: Vec<JobOutput>,
}

impl CommandOutput for JobListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "source", "host", "company", "title"]);
        for job in &self.jobs {
            table.add_row(vec![
                job.id.clone(),
                job.source.clone(),
                job.host.clone().unwrap_or_else(|| "-".to_string()),
                truncate(&job.company, 24),
                truncate(&job.title, 32),
            ]);
        }
        render_list("job", &table, self.jobs.len())
    }
}

pub async fn execute(args: JobArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        JobCommands::Add {
            source,
            url,
            title,
            company,
            id,
        } => {
            if host_of(&url).is_none() {
                anyhow::bail!("Apply URL has no host: {url}");
            }
            let job = Job {
                id: id.unwrap_or_else(Uuid::new_v4),
                source: JobSource::parse(&source),
                apply_url: url,
                title,
                company,
            };
            ctx.catalog.upsert_job(&job).await.context("Failed to save job")?;
            output(&JobOutput::from(&job), json_mode);
        }
        JobCommands::List => {
            let jobs = ctx.catalog.list_jobs().await.context("Failed to list jobs")?;
            output(
                &JobListOutput {
                    jobs: jobs.iter().map(JobOutput::from).collect(),
                },
                json_mode,
            );
        }
    }
    Ok(())
}
