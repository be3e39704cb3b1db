//! Implementation of the `autoapply worker` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapters::agents::AgentSettings;
use crate::adapters::artifacts::FilesystemArtifactStore;
use crate::adapters::browser::{ScriptedBrowser, WebDriverLauncher};
use crate::adapters::notifications::notifier_from_config;
use crate::cli::commands::task::status_rows;
use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::{ArtifactStore, BrowserLauncher};
use crate::services::{
    AgentRegistry, DomainAdmissionController, ExecutorPorts, RetryPolicy, SchedulerSettings,
    TaskExecutor, TaskScheduler,
};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Number of concurrent task runs (overrides scheduler.workers)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Drain every task that is due now, then exit
    #[arg(long)]
    pub once: bool,

    /// Use a scripted browser that accepts every form instead of WebDriver
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkerOutput {
    pub worker_id: String,
    pub promoted: usize,
    pub dispatched: usize,
    pub counts: Vec<(String, u64)>,
}

impl CommandOutput for WorkerOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["status", "count"]);
        for (status, count) in &self.counts {
            table.add_row(vec![status.clone(), count.to_string()]);
        }
        format!(
            "Worker {} finished: {} dispatched, {} promoted for retry.\n\n{table}",
            self.worker_id, self.dispatched, self.promoted
        )
    }
}

/// Assemble the executor and scheduler from configuration.
pub fn build_scheduler(ctx: &AppContext, args: &WorkerArgs) -> Result<TaskScheduler> {
    let config = &ctx.config;

    let launcher: Arc<dyn BrowserLauncher> = if args.dry_run {
        warn!("dry run: forms are filled against a scripted browser, nothing is submitted");
        Arc::new(ScriptedBrowser::accepting())
    } else {
        Arc::new(WebDriverLauncher::new(&config.browser).context("Failed to configure WebDriver")?)
    };
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FilesystemArtifactStore::new(&config.artifacts.dir));
    let notifier = notifier_from_config(&config.notifications).context("Failed to configure notifier")?;

    let agents = Arc::new(AgentRegistry::with_defaults(
        launcher,
        artifacts,
        AgentSettings::from_config(&config.browser),
    ));

    let ports = ExecutorPorts {
        tasks: ctx.tasks.clone(),
        audit: ctx.audit.clone(),
        jobs: ctx.catalog.clone(),
        profiles: ctx.catalog.clone(),
        notifier,
    };
    let executor = TaskExecutor::new(
        ports,
        agents,
        DomainAdmissionController::from_config(&config.admission),
        RetryPolicy::from_config(&config.retry),
    )
    .with_requeue_delay(Duration::from_millis(config.admission.requeue_delay_ms));

    let mut settings = SchedulerSettings::from_config(&config.scheduler);
    if let Some(workers) = args.workers {
        settings.workers = workers.max(1);
    }

    Ok(TaskScheduler::new(
        ctx.tasks.clone(),
        ctx.audit.clone(),
        Arc::new(executor),
        settings,
    ))
}

pub async fn execute(args: WorkerArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let scheduler = build_scheduler(&ctx, &args)?;
    let worker_id = scheduler.settings().worker_id.clone();

    info!(
        worker_id = %worker_id,
        workers = scheduler.settings().workers,
        once = args.once,
        "worker starting"
    );

    let report = if args.once {
        scheduler.run_until_idle().await.context("Worker run failed")?
    } else {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, finishing in-flight tasks");
                let _ = shutdown_tx.send(true);
            }
        });
        scheduler.run(shutdown_rx).await.context("Worker run failed")?;
        Default::default()
    };

    let counts = ctx
        .task_service()
        .status_counts()
        .await
        .context("Failed to count tasks")?;
    output(
        &WorkerOutput {
            worker_id,
            promoted: report.promoted,
            dispatched: report.dispatched,
            counts: status_rows(&counts),
        },
        json_mode,
    );
    Ok(())
}
