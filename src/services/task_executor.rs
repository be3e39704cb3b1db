//! Runs one attempt of an application task.
//!
//! The executor is the only place an [`AgentResult`] becomes a task
//! transition. One call to [`TaskExecutor::execute`]:
//!
//! 1. reloads the task and does nothing unless it is still `queued`
//! 2. resolves the job and candidate (missing data fails the task permanently)
//! 3. acquires an admission slot for the apply host, or defers the task
//! 4. moves the task to `processing` and runs the vendor agent
//! 5. reports the outcome, persists the transition, then releases the slot
//! 6. emits a completion event when the task reached a terminal state

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentOutcome, AgentResult, ApplicationTask, AuditPayload, AuditStep, CompletionEvent,
    FailureKind, Job, TaskStatus,
};
use crate::domain::ports::{
    ApplyRequest, AuditRepository, JobCatalog, Notifier, ProfileDirectory, TaskRepository,
};
use crate::infrastructure::logging::PiiScrubber;
use crate::services::admission::{
    AdmissionRejected, AdmissionSignal, AdmissionSlot, DomainAdmissionController,
};
use crate::services::agent_registry::AgentRegistry;
use crate::services::audit_trail::AuditTrail;
use crate::services::retry::RetryPolicy;

const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(15);

/// Persistence and outbound ports the executor works against.
#[derive(Clone)]
pub struct ExecutorPorts {
    pub tasks: Arc<dyn TaskRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub jobs: Arc<dyn JobCatalog>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

/// What one `execute` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionReport {
    /// The task was not `queued`; nothing happened
    Skipped { status: TaskStatus },
    /// No admission slot; the task stays `queued` until `not_before`
    Deferred {
        reason: &'static str,
        not_before: DateTime<Utc>,
    },
    /// An attempt ran and the task moved to `status`
    Completed { status: TaskStatus, attempt: u32 },
}

/// How an attempt ends, before it is persisted.
struct Transition {
    status: TaskStatus,
    step: AuditStep,
    error: Option<String>,
    retry_in: Option<Duration>,
    payload: AuditPayload,
}

pub struct TaskExecutor {
    ports: ExecutorPorts,
    agents: Arc<AgentRegistry>,
    admission: DomainAdmissionController,
    retry: RetryPolicy,
    requeue_delay: Duration,
    scrubber: PiiScrubber,
}

impl TaskExecutor {
    pub fn new(
        ports: ExecutorPorts,
        agents: Arc<AgentRegistry>,
        admission: DomainAdmissionController,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ports,
            agents,
            admission,
            retry,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            scrubber: PiiScrubber::new(),
        }
    }

    /// Delay before a task that could not be admitted is claimable again.
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    pub fn admission(&self) -> &DomainAdmissionController {
        &self.admission
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run one attempt of `task_id` on behalf of `worker`.
    #[instrument(skip_all, fields(task_id = %task_id, worker = %worker))]
    pub async fn execute(&self, task_id: Uuid, worker: &str) -> DomainResult<ExecutionReport> {
        let task = self
            .ports
            .tasks
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))?;

        if task.status != TaskStatus::Queued {
            info!(status = %task.status, "task not queued, skipping");
            return Ok(ExecutionReport::Skipped { status: task.status });
        }

        let Some(job) = self.ports.jobs.get_job(task.job_id).await? else {
            let reason = format!("job {} not found", task.job_id);
            return self.fail_before_dispatch(task, worker, None, reason).await;
        };
        let Some(profile) = self.ports.profiles.get_profile(task.user_id).await? else {
            let reason = format!("candidate profile for user {} not found", task.user_id);
            return self.fail_before_dispatch(task, worker, Some(&job), reason).await;
        };
        let Some(host) = job.apply_host() else {
            let reason = format!("apply URL has no host: {}", job.apply_url);
            return self.fail_before_dispatch(task, worker, Some(&job), reason).await;
        };

        let slot = match self.admission.acquire(&host).await {
            Ok(slot) => slot,
            Err(rejected) => return self.defer(task, worker, &rejected).await,
        };

        let agent = self.agents.resolve(&job.source);
        let Some((mut task, trail)) = self
            .begin_attempt(
                task,
                worker,
                AuditPayload::new()
                    .with("worker", worker)
                    .with("agent", agent.name())
                    .with("host", host.as_str()),
            )
            .await?
        else {
            self.admission.release(slot);
            let status = self.current_status(task_id).await?;
            return Ok(ExecutionReport::Skipped { status });
        };

        info!(
            host = %host,
            agent = agent.name(),
            attempt = task.attempt_count,
            "dispatching application"
        );

        let request = ApplyRequest {
            task_id,
            apply_url: &job.apply_url,
            profile: &profile,
            resume: profile.resume_file_reference.as_deref(),
        };
        let result = match AssertUnwindSafe(agent.apply(request, &trail)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.panicked(&trail, agent.name(), message).await
            }
        };

        let domain_status = self
            .admission
            .report_outcome(&host, AdmissionSignal::from_result(&result));

        info!(
            host = %host,
            outcome = %result.outcome,
            domain_status = %domain_status,
            "agent finished"
        );

        let transition = self.classify(&task, &job, &result);
        self.finish(&mut task, &trail, Some(&job), transition, Some(slot)).await
    }

    /// Map an agent result to the task's next state.
    fn classify(&self, task: &ApplicationTask, job: &Job, result: &AgentResult) -> Transition {
        let error = result.error.clone();
        let base = AuditPayload::new()
            .with("outcome", result.outcome.as_str())
            .with_opt("failure", result.failure.map(|f| f.as_str()))
            .with_opt("artifact", result.artifact.clone());

        match result.outcome {
            AgentOutcome::Submitted => Transition {
                status: TaskStatus::Submitted,
                step: AuditStep::Completed,
                error: None,
                retry_in: None,
                payload: base,
            },
            AgentOutcome::CaptchaDetected => Transition {
                status: TaskStatus::CaptchaDetected,
                step: AuditStep::CaptchaBlocked,
                error: error.or_else(|| Some("captcha detected".to_string())),
                retry_in: None,
                payload: base.with("apply_url", job.apply_url.as_str()),
            },
            AgentOutcome::TransientFailure if self.retry.allows_retry(task.attempt_count) => {
                let delay = self.retry.backoff(task.attempt_count);
                Transition {
                    status: TaskStatus::Failed,
                    step: AuditStep::AttemptFailed,
                    error: error.or_else(|| Some("transient failure".to_string())),
                    retry_in: Some(delay),
                    payload: base.with("retry_in_ms", duration_ms(delay)),
                }
            }
            AgentOutcome::TransientFailure => Transition {
                status: TaskStatus::FailedPermanent,
                step: AuditStep::FailedPermanent,
                error: error.or_else(|| Some("transient failure".to_string())),
                retry_in: None,
                payload: base.with("reason", "retries_exhausted"),
            },
            AgentOutcome::TerminalFailure => Transition {
                status: TaskStatus::FailedPermanent,
                step: AuditStep::FailedPermanent,
                error: error.or_else(|| Some("terminal failure".to_string())),
                retry_in: None,
                payload: base.with("reason", "terminal"),
            },
        }
    }

    /// Move a queued task to `processing` and open its attempt trail.
    ///
    /// Returns `None` when someone else changed the task first and it is no
    /// longer queued.
    async fn begin_attempt(
        &self,
        mut task: ApplicationTask,
        worker: &str,
        payload: AuditPayload,
    ) -> DomainResult<Option<(ApplicationTask, AuditTrail)>> {
        task.start_attempt(worker)?;
        match self.ports.tasks.update(&mut task).await {
            Ok(()) => {}
            Err(DomainError::ConcurrencyConflict { .. }) => {
                let current = self.current_status(task.id).await?;
                if current != TaskStatus::Queued {
                    info!(status = %current, "task changed before dispatch");
                    return Ok(None);
                }
                return Err(DomainError::ConcurrencyConflict {
                    entity: "application_task".to_string(),
                    id: task.id.to_string(),
                });
            }
            Err(err) => return Err(err),
        }

        let trail = AuditTrail::open(self.ports.audit.clone(), task.id, task.attempt_count).await?;
        trail
            .record(
                AuditStep::Dispatch,
                payload.with("attempt", task.attempt_count),
            )
            .await?;
        Ok(Some((task, trail)))
    }

    /// Persist the end of an attempt, audit it and emit the completion event.
    ///
    /// `slot` is held until the task has left `processing` in storage.
    async fn finish(
        &self,
        task: &mut ApplicationTask,
        trail: &AuditTrail,
        job: Option<&Job>,
        transition: Transition,
        slot: Option<AdmissionSlot>,
    ) -> DomainResult<ExecutionReport> {
        let Transition {
            status,
            step,
            error,
            retry_in,
            payload,
        } = transition;

        match error {
            Some(message) => task.fail(status, message)?,
            None => task.transition_to(status)?,
        }
        task.not_before = retry_in.map(|delay| Utc::now() + chrono_duration(delay));
        self.ports.tasks.update(task).await?;
        if let Some(slot) = slot {
            self.admission.release(slot);
        }

        let payload = payload
            .with("status", status.as_str())
            .with_opt("error", task.last_error.clone().filter(|_| status != TaskStatus::Submitted));
        trail.record(step, payload).await?;

        match status {
            TaskStatus::Failed => warn!(
                attempt = task.attempt_count,
                error = task.last_error.as_deref().unwrap_or(""),
                "attempt failed, retry scheduled"
            ),
            TaskStatus::Submitted => info!(attempt = task.attempt_count, "application submitted"),
            _ => warn!(
                status = %status,
                error = task.last_error.as_deref().unwrap_or(""),
                "application ended without submission"
            ),
        }

        if task.is_terminal() {
            self.emit(task, job).await;
        }

        Ok(ExecutionReport::Completed {
            status,
            attempt: task.attempt_count,
        })
    }

    /// Structural failure found before any ATS contact.
    async fn fail_before_dispatch(
        &self,
        task: ApplicationTask,
        worker: &str,
        job: Option<&Job>,
        reason: String,
    ) -> DomainResult<ExecutionReport> {
        warn!(reason = %reason, "task cannot be dispatched");
        let task_id = task.id;
        let payload = AuditPayload::new().with("worker", worker).with("precheck", "failed");
        let Some((mut task, trail)) = self.begin_attempt(task, worker, payload).await? else {
            let status = self.current_status(task_id).await?;
            return Ok(ExecutionReport::Skipped { status });
        };

        let transition = Transition {
            status: TaskStatus::FailedPermanent,
            step: AuditStep::FailedPermanent,
            error: Some(reason),
            retry_in: None,
            payload: AuditPayload::new().with("reason", "precheck"),
        };
        self.finish(&mut task, &trail, job, transition, None).await
    }

    /// Give the task back to the queue without consuming an attempt.
    async fn defer(
        &self,
        mut task: ApplicationTask,
        worker: &str,
        rejected: &AdmissionRejected,
    ) -> DomainResult<ExecutionReport> {
        let delay = rejected
            .retry_after()
            .map_or(self.requeue_delay, |after| after.max(self.requeue_delay));
        let not_before = Utc::now() + chrono_duration(delay);

        let stored = if task.assigned_worker.as_deref() == Some(worker) {
            self.ports.tasks.release_claim(task.id, worker, not_before).await
        } else {
            task.not_before = Some(not_before);
            self.ports.tasks.update(&mut task).await
        };
        match stored {
            Ok(()) => {}
            Err(DomainError::ConcurrencyConflict { .. }) => {
                let status = self.current_status(task.id).await?;
                return Ok(ExecutionReport::Skipped { status });
            }
            Err(err) => return Err(err),
        }

        let trail = AuditTrail::open(self.ports.audit.clone(), task.id, 0).await?;
        trail
            .record(
                AuditStep::AdmissionDeferred,
                AuditPayload::new()
                    .with("host", rejected.host())
                    .with("reason", rejected.reason())
                    .with("retry_in_ms", duration_ms(delay)),
            )
            .await?;

        info!(
            host = rejected.host(),
            reason = rejected.reason(),
            delay_ms = duration_ms(delay),
            "admission refused, task deferred"
        );

        Ok(ExecutionReport::Deferred {
            reason: rejected.reason(),
            not_before,
        })
    }

    /// Agent panics become internal (transient) failures.
    async fn panicked(
        &self,
        trail: &AuditTrail,
        agent: &str,
        panic: String,
    ) -> AgentResult {
        let message = format!("agent {agent} panicked: {}", self.scrubber.scrub(&panic));
        error!(agent = agent, error = %message, "agent panicked");
        trail
            .note(
                AuditStep::Error,
                AuditPayload::new()
                    .with("message", message.as_str())
                    .with("failure", FailureKind::Internal.as_str()),
            )
            .await;
        AgentResult::failure(FailureKind::Internal, message)
    }

    async fn emit(&self, task: &ApplicationTask, job: Option<&Job>) {
        let event = CompletionEvent::for_task(task, job);
        if let Err(err) = self.ports.notifier.notify(&event).await {
            warn!(error = %err, outcome = %event.outcome, "failed to deliver completion event");
        }
    }

    async fn current_status(&self, task_id: Uuid) -> DomainResult<TaskStatus> {
        self.ports
            .tasks
            .get(task_id)
            .await?
            .map(|t| t.status)
            .ok_or(DomainError::TaskNotFound(task_id))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn chrono_duration(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1))
}

fn duration_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
