//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use autoapply::adapters::sqlite::{
    create_migrated_test_pool, SqliteAuditRepository, SqliteCatalog, SqliteTaskRepository,
};
use autoapply::domain::errors::DomainResult;
use autoapply::domain::models::{
    AdmissionConfig, AgentResult, ApplicationTask, CandidateProfile, CompletionEvent, Job,
    JobSource, TaskStatus,
};
use autoapply::domain::ports::{
    Agent, ApplyRequest, Notifier, NotifyError, TaskFilter, TaskRepository,
};
use autoapply::services::{
    AgentRegistry, AuditTrail, DomainAdmissionController, ExecutorPorts, RetryPolicy,
    SchedulerSettings, TaskExecutor, TaskScheduler, TaskService,
};

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Notifier that keeps every event it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<CompletionEvent>>,
}

impl RecordingNotifier {
    pub async fn events(&self) -> Vec<CompletionEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Agent that returns queued results in order, then `fallback`.
///
/// While a run is in flight it samples how many tasks the repository
/// reports as `processing`, and keeps the peak.
pub struct ScriptedAgent {
    results: Mutex<VecDeque<AgentResult>>,
    fallback: AgentResult,
    delay: Duration,
    probe: Option<Arc<SqliteTaskRepository>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    peak_processing: AtomicU64,
}

impl ScriptedAgent {
    pub fn new(results: impl IntoIterator<Item = AgentResult>, fallback: AgentResult) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            fallback,
            delay: Duration::ZERO,
            probe: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            peak_processing: AtomicU64::new(0),
        }
    }

    pub fn always(result: AgentResult) -> Self {
        Self::new([], result)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn probing(mut self, tasks: Arc<SqliteTaskRepository>) -> Self {
        self.probe = Some(tasks);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_processing(&self) -> u64 {
        self.peak_processing.load(Ordering::SeqCst)
    }

    async fn sample_processing(&self) {
        if let Some(tasks) = &self.probe {
            let counts = tasks.count_by_status().await.unwrap();
            let processing = counts.get(&TaskStatus::Processing).copied().unwrap_or(0);
            self.peak_processing.fetch_max(processing, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn apply(&self, _request: ApplyRequest<'_>, _audit: &AuditTrail) -> AgentResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        self.sample_processing().await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sample_processing().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self.results.lock().await.pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Task repository whose writes out of `processing` are slow.
///
/// Widens the gap between an attempt ending and its new status being stored,
/// and records the most tasks seen `processing` during that gap.
pub struct SlowFinishRepository {
    inner: Arc<SqliteTaskRepository>,
    delay: Duration,
    peak_processing: AtomicU64,
}

impl SlowFinishRepository {
    pub fn new(inner: Arc<SqliteTaskRepository>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            peak_processing: AtomicU64::new(0),
        }
    }

    pub fn peak_processing(&self) -> u64 {
        self.peak_processing.load(Ordering::SeqCst)
    }

    async fn sample(&self) {
        let counts = self.inner.count_by_status().await.unwrap();
        let processing = counts.get(&TaskStatus::Processing).copied().unwrap_or(0);
        self.peak_processing.fetch_max(processing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskRepository for SlowFinishRepository {
    async fn create(&self, task: &ApplicationTask) -> DomainResult<()> {
        self.inner.create(task).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ApplicationTask>> {
        self.inner.get(id).await
    }

    async fn update(&self, task: &mut ApplicationTask) -> DomainResult<()> {
        let leaving_processing = task.status != TaskStatus::Processing
            && self
                .inner
                .get(task.id)
                .await?
                .is_some_and(|stored| stored.status == TaskStatus::Processing);
        if leaving_processing {
            self.sample().await;
            tokio::time::sleep(self.delay).await;
            self.sample().await;
        }
        self.inner.update(task).await
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<ApplicationTask>> {
        self.inner.list(filter).await
    }

    async fn find_active(&self, user_id: Uuid, job_id: Uuid) -> DomainResult<Option<ApplicationTask>> {
        self.inner.find_active(user_id, job_id).await
    }

    async fn claim_next(&self, worker: &str, now: DateTime<Utc>) -> DomainResult<Option<ApplicationTask>> {
        self.inner.claim_next(worker, now).await
    }

    async fn release_claim(&self, id: Uuid, worker: &str, not_before: DateTime<Utc>) -> DomainResult<()> {
        self.inner.release_claim(id, worker, not_before).await
    }

    async fn release_stale_claims(&self, claimed_before: DateTime<Utc>) -> DomainResult<u64> {
        self.inner.release_stale_claims(claimed_before).await
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<ApplicationTask>> {
        self.inner.due_retries(now, limit).await
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        self.inner.count_by_status().await
    }
}

/// In-memory database with one candidate profile.
pub struct Fixture {
    pub tasks: Arc<SqliteTaskRepository>,
    pub audit: Arc<SqliteAuditRepository>,
    pub catalog: Arc<SqliteCatalog>,
    pub notifier: Arc<RecordingNotifier>,
    pub profile: CandidateProfile,
}

impl Fixture {
    pub async fn new() -> Self {
        let pool = create_migrated_test_pool().await.unwrap();
        let catalog = Arc::new(SqliteCatalog::new(pool.clone()));
        let profile = CandidateProfile {
            user_id: Uuid::new_v4(),
            full_name: "Grace Hopper".into(),
            email: Some("grace@example.com".into()),
            phone: Some("+1 555 0100".into()),
            location: Some("Arlington, VA".into()),
            resume_file_reference: Some("/resumes/grace.pdf".into()),
        };
        catalog.upsert_profile(&profile).await.unwrap();

        Self {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            audit: Arc::new(SqliteAuditRepository::new(pool)),
            catalog,
            notifier: Arc::new(RecordingNotifier::default()),
            profile,
        }
    }

    pub fn service(&self) -> TaskService {
        TaskService::new(
            self.tasks.clone(),
            self.audit.clone(),
            self.catalog.clone(),
            self.catalog.clone(),
        )
    }

    pub async fn add_job(&self, source: JobSource, apply_url: &str) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            source,
            apply_url: apply_url.to_string(),
            title: "Compiler Engineer".into(),
            company: "Acme".into(),
        };
        self.catalog.upsert_job(&job).await.unwrap();
        job
    }

    /// Queue an application of the fixture profile to a new job.
    pub async fn queue(&self, source: JobSource, apply_url: &str) -> ApplicationTask {
        let job = self.add_job(source, apply_url).await;
        self.service()
            .create_task(self.profile.user_id, job.id)
            .await
            .unwrap()
    }

    pub async fn reload(&self, task_id: Uuid) -> ApplicationTask {
        self.tasks.get(task_id).await.unwrap().unwrap()
    }

    pub fn executor(
        &self,
        agents: AgentRegistry,
        admission: &AdmissionConfig,
        retry: RetryPolicy,
    ) -> Arc<TaskExecutor> {
        self.executor_over(self.tasks.clone(), agents, admission, retry)
    }

    /// Executor persisting through `tasks` instead of the fixture repository.
    pub fn executor_over(
        &self,
        tasks: Arc<dyn TaskRepository>,
        agents: AgentRegistry,
        admission: &AdmissionConfig,
        retry: RetryPolicy,
    ) -> Arc<TaskExecutor> {
        let ports = ExecutorPorts {
            tasks,
            audit: self.audit.clone(),
            jobs: self.catalog.clone(),
            profiles: self.catalog.clone(),
            notifier: self.notifier.clone(),
        };
        Arc::new(
            TaskExecutor::new(
                ports,
                Arc::new(agents),
                DomainAdmissionController::from_config(admission),
                retry,
            )
            .with_requeue_delay(Duration::from_millis(5)),
        )
    }

    pub fn scheduler(&self, executor: Arc<TaskExecutor>, workers: usize) -> TaskScheduler {
        TaskScheduler::new(
            self.tasks.clone(),
            self.audit.clone(),
            executor,
            SchedulerSettings {
                workers,
                poll_interval: Duration::from_millis(5),
                worker_id: "test-worker".into(),
                claim_lease: Duration::from_secs(600),
            },
        )
    }
}

/// Retry policy with the default ceiling and no waiting between attempts.
pub fn immediate_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, 0, 0)
}

/// Admission that never throttles by rate, only by concurrency.
pub fn permissive_admission(max_concurrent: u32) -> AdmissionConfig {
    let mut config = AdmissionConfig::default();
    config.default_policy.requests_per_minute = 10_000;
    config.default_policy.max_concurrent = max_concurrent;
    config
}

pub fn registry_of(agent: Arc<ScriptedAgent>) -> AgentRegistry {
    AgentRegistry::new(agent)
}
