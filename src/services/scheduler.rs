//! Worker pool that feeds queued tasks to the executor.
//!
//! Each tick drops abandoned claims, promotes failed tasks whose backoff has
//! elapsed, then claims queued tasks oldest first while worker permits are
//! free. A claimed task
//! runs on its own tokio task holding one permit.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AuditPayload, AuditStep, SchedulerConfig, TaskStatus};
use crate::domain::ports::{AuditRepository, TaskRepository};
use crate::services::audit_trail::AuditTrail;
use crate::services::task_executor::{ExecutionReport, TaskExecutor};

const PROMOTE_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub workers: usize,
    pub poll_interval: Duration,
    /// Recorded in `assigned_worker` for every claim
    pub worker_id: String,
    /// Claims on queued tasks older than this belong to a dead worker
    pub claim_lease: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            worker_id: config
                .worker_id
                .clone()
                .unwrap_or_else(|| format!("worker-{}", std::process::id())),
            claim_lease: Duration::from_millis(config.claim_lease_ms),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Counts from one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub promoted: usize,
    pub dispatched: usize,
}

pub struct TaskScheduler {
    tasks: Arc<dyn TaskRepository>,
    audit: Arc<dyn AuditRepository>,
    executor: Arc<TaskExecutor>,
    settings: SchedulerSettings,
    permits: Arc<Semaphore>,
}

impl TaskScheduler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        audit: Arc<dyn AuditRepository>,
        executor: Arc<TaskExecutor>,
        settings: SchedulerSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
        Self {
            tasks,
            audit,
            executor,
            settings,
            permits,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Move failed tasks whose backoff elapsed back to `queued`.
    pub async fn promote_due_retries(&self) -> DomainResult<usize> {
        let due = self.tasks.due_retries(Utc::now(), PROMOTE_BATCH).await?;
        let mut promoted = 0;

        for mut task in due {
            let previous_error = task.last_error.clone();
            task.transition_to(TaskStatus::Queued)?;
            match self.tasks.update(&mut task).await {
                Ok(()) => {}
                Err(DomainError::ConcurrencyConflict { .. }) => {
                    debug!(task_id = %task.id, "retry promotion lost a race");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let trail = AuditTrail::open(self.audit.clone(), task.id, 0).await?;
            trail
                .record(
                    AuditStep::Retry,
                    AuditPayload::new()
                        .with("attempt_count", task.attempt_count)
                        .with_opt("previous_error", previous_error),
                )
                .await?;
            promoted += 1;
        }

        if promoted > 0 {
            info!(promoted, "promoted failed tasks for retry");
        }
        Ok(promoted)
    }

    /// Make queued tasks whose claim outlived the lease claimable again.
    pub async fn release_stale_claims(&self) -> DomainResult<u64> {
        let lease = chrono::Duration::from_std(self.settings.claim_lease)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let released = self.tasks.release_stale_claims(Utc::now() - lease).await?;
        if released > 0 {
            warn!(released, "released abandoned claims");
        }
        Ok(released)
    }

    /// One scheduling pass: drop abandoned claims, promote retries, then claim
    /// while permits remain.
    pub async fn tick(&self, running: &mut JoinSet<()>) -> DomainResult<TickReport> {
        self.release_stale_claims().await?;
        let promoted = self.promote_due_retries().await?;
        let mut dispatched = 0;

        loop {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            let Some(task) = self
                .tasks
                .claim_next(&self.settings.worker_id, Utc::now())
                .await?
            else {
                break;
            };

            debug!(task_id = %task.id, worker = %self.settings.worker_id, "claimed task");
            let executor = self.executor.clone();
            let tasks = self.tasks.clone();
            let worker = self.settings.worker_id.clone();
            running.spawn(async move {
                let _permit = permit;
                run_claimed(executor, tasks, task.id, worker).await;
            });
            dispatched += 1;
        }

        Ok(TickReport {
            promoted,
            dispatched,
        })
    }

    /// Process until nothing is due and nothing is running.
    pub async fn run_until_idle(&self) -> DomainResult<TickReport> {
        let mut running = JoinSet::new();
        let mut total = TickReport::default();

        loop {
            let report = self.tick(&mut running).await?;
            total.promoted += report.promoted;
            total.dispatched += report.dispatched;

            if running.join_next().await.is_none() && report.dispatched == 0 && report.promoted == 0 {
                break;
            }
        }

        info!(
            promoted = total.promoted,
            dispatched = total.dispatched,
            "scheduler idle"
        );
        Ok(total)
    }

    /// Poll until `shutdown` flips to true, then wait for in-flight runs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DomainResult<()> {
        let mut running = JoinSet::new();
        info!(
            workers = self.settings.workers,
            worker = %self.settings.worker_id,
            "scheduler started"
        );

        while !*shutdown.borrow() {
            if let Err(err) = self.tick(&mut running).await {
                error!(error = %err, "scheduler tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                Some(_) = running.join_next() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = running.len(), "scheduler stopping, draining in-flight runs");
        while running.join_next().await.is_some() {}
        info!("scheduler stopped");
        Ok(())
    }
}

/// Execute a claimed task; a claim is never left dangling on error.
async fn run_claimed(
    executor: Arc<TaskExecutor>,
    tasks: Arc<dyn TaskRepository>,
    task_id: Uuid,
    worker: String,
) {
    let outcome = AssertUnwindSafe(executor.execute(task_id, &worker))
        .catch_unwind()
        .await;

    let failed = match outcome {
        Ok(Ok(ExecutionReport::Completed { status, attempt })) => {
            debug!(task_id = %task_id, status = %status, attempt, "run finished");
            false
        }
        Ok(Ok(report)) => {
            debug!(task_id = %task_id, ?report, "run did not dispatch");
            false
        }
        Ok(Err(err)) => {
            error!(task_id = %task_id, error = %err, "task execution failed");
            true
        }
        Err(_) => {
            error!(task_id = %task_id, "task execution panicked");
            true
        }
    };

    if failed {
        // Only succeeds while the task is still queued and ours.
        if let Err(err) = tasks.release_claim(task_id, &worker, Utc::now()).await {
            warn!(task_id = %task_id, error = %err, "could not release claim");
        }
    }
}
