//! Task CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{ApplicationTask, AuditLogEntry, Config, TaskStatus};
use crate::domain::ports::TaskFilter;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Queue an application of a candidate to a job
    Create {
        /// Candidate user ID
        #[arg(long)]
        user: Uuid,
        /// Job ID
        #[arg(long)]
        job: Uuid,
    },
    /// Show task details
    Show {
        /// Task ID
        id: Uuid,
    },
    /// List tasks, oldest first
    List {
        /// Filter by status (queued, processing, submitted, failed, ...)
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by candidate user ID
        #[arg(long)]
        user: Option<Uuid>,
        /// Filter by job ID
        #[arg(long)]
        job: Option<Uuid>,
        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Print the audit trail of a task
    Audit {
        /// Task ID
        id: Uuid,
    },
    /// Cancel a queued or failed task
    Cancel {
        /// Task ID
        id: Uuid,
        /// Reason recorded in the audit trail
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Show task counts by status
    Stats,
}

#[derive(Debug, Serialize)]
pub struct TaskOutput {
    pub id: String,
    pub user_id: String,
    pub job_id: String,
    pub status: String,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub assigned_worker: Option<String>,
    pub not_before: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&ApplicationTask> for TaskOutput {
    fn from(task: &ApplicationTask) -> Self {
        Self {
            id: task.id.to_string(),
            user_id: task.user_id.to_string(),
            job_id: task.job_id.to_string(),
            status: task.status.as_str().to_string(),
            attempt_count: task.attempt_count,
            last_error: task.last_error.clone(),
            assigned_worker: task.assigned_worker.clone(),
            not_before: task.not_before.map(|t| t.to_rfc3339()),
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDetailOutput {
    pub task: TaskOutput,
    #[serde(skip)]
    heading: &'static str,
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![
            self.heading.to_string(),
            format!("  ID:       {}", task.id),
            format!("  User:     {}", task.user_id),
            format!("  Job:      {}", task.job_id),
            format!("  Status:   {}", task.status),
            format!("  Attempts: {}", task.attempt_count),
            format!("  Created:  {}", task.created_at),
            format!("  Updated:  {}", task.updated_at),
        ];
        if let Some(worker) = &task.assigned_worker {
            lines.push(format!("  Worker:   {worker}"));
        }
        if let Some(not_before) = &task.not_before {
            lines.push(format!("  Not before: {not_before}"));
        }
        if let Some(error) = &task.last_error {
            lines.push(format!("  Last error: {error}"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.task).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskOutput>,
    pub total: usize,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "status", "attempts", "job", "updated", "last error"]);
        for task in &self.tasks {
            table.add_row(vec![
                task.id.clone(),
                task.status.clone(),
                task.attempt_count.to_string(),
                task.job_id.clone(),
                task.updated_at.clone(),
                truncate(task.last_error.as_deref().unwrap_or("-"), 40),
            ]);
        }
        render_list("task", &table, self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryOutput {
    pub attempt: u32,
    pub sequence: u64,
    pub step: String,
    pub payload: serde_json::Value,
    pub timestamp: String,
}

impl From<&AuditLogEntry> for AuditEntryOutput {
    fn from(entry: &AuditLogEntry) -> Self {
        Self {
            attempt: entry.attempt,
            sequence: entry.sequence,
            step: entry.step.as_str().to_string(),
            payload: serde_json::to_value(&entry.payload).unwrap_or_default(),
            timestamp: entry.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditOutput {
    pub task_id: String,
    pub entries: Vec<AuditEntryOutput>,
}

impl CommandOutput for AuditOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["attempt", "seq", "step", "payload"]);
        for entry in &self.entries {
            table.add_row(vec![
                entry.attempt.to_string(),
                entry.sequence.to_string(),
                entry.step.clone(),
                truncate(&entry.payload.to_string(), 80),
            ]);
        }
        format!(
            "Audit trail for {}\n{}",
            self.task_id,
            render_list("entry", &table, self.entries.len())
        )
    }
}

#[derive(Debug, Serialize)]
pub struct StatsOutput {
    pub counts: Vec<(String, u64)>,
    pub total: u64,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["status", "count"]);
        for (status, count) in &self.counts {
            table.add_row(vec![status.clone(), count.to_string()]);
        }
        format!("{table}\n\nTotal: {}", self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        let counts: serde_json::Map<String, serde_json::Value> = self
            .counts
            .iter()
            .map(|(status, count)| (status.clone(), serde_json::json!(count)))
            .collect();
        serde_json::json!({ "counts": counts, "total": self.total })
    }
}

pub async fn execute(args: TaskArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let service = ctx.task_service();

    match args.command {
        TaskCommands::Create { user, job } => {
            let task = service
                .create_task(user, job)
                .await
                .context("Failed to create task")?;
            output(
                &TaskDetailOutput {
                    task: TaskOutput::from(&task),
                    heading: "Task queued:",
                },
                json_mode,
            );
        }
        TaskCommands::Show { id } => {
            let task = service.get_task(id).await.with_context(|| {
                format!("Task {id} not found. Use 'autoapply task list' to see available tasks.")
            })?;
            output(
                &TaskDetailOutput {
                    task: TaskOutput::from(&task),
                    heading: "Task details:",
                },
                json_mode,
            );
        }
        TaskCommands::List {
            status,
            user,
            job,
            limit,
        } => {
            let status = status
                .map(|s| {
                    TaskStatus::from_str(&s).ok_or_else(|| anyhow::anyhow!("Unknown task status: {s}"))
                })
                .transpose()?;
            let tasks = service
                .list_tasks(TaskFilter {
                    status,
                    user_id: user,
                    job_id: job,
                    limit: Some(limit),
                })
                .await
                .context("Failed to list tasks")?;
            let tasks: Vec<TaskOutput> = tasks.iter().map(TaskOutput::from).collect();
            let total = tasks.len();
            output(&TaskListOutput { tasks, total }, json_mode);
        }
        TaskCommands::Audit { id } => {
            let entries = service
                .audit_log(id)
                .await
                .context("Failed to read audit trail")?;
            output(
                &AuditOutput {
                    task_id: id.to_string(),
                    entries: entries.iter().map(AuditEntryOutput::from).collect(),
                },
                json_mode,
            );
        }
        TaskCommands::Cancel { id, reason } => {
            let task = service
                .cancel_task(id, reason.as_deref())
                .await
                .context("Failed to cancel task")?;
            output(
                &TaskDetailOutput {
                    task: TaskOutput::from(&task),
                    heading: "Task cancelled:",
                },
                json_mode,
            );
        }
        TaskCommands::Stats => {
            let counts = service
                .status_counts()
                .await
                .context("Failed to count tasks")?;
            let counts = status_rows(&counts);
            let total = counts.iter().map(|(_, c)| c).sum();
            output(&StatsOutput { counts, total }, json_mode);
        }
    }

    Ok(())
}


/// One row per status in lifecycle order, zero-filled.
pub fn status_rows(counts: &HashMap<TaskStatus, u64>) -> Vec<(String, u64)> {
    TaskStatus::all()
        .iter()
        .map(|s| (s.as_str().to_string(), counts.get(s).copied().unwrap_or(0)))
        .collect()
}
