//! Cross-cutting properties: retry ceiling, CAPTCHA ordering, audit
//! ordering and execute idempotence.

mod common;

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use autoapply::adapters::agents::{AgentSettings, GenericAgent, GreenhouseAgent, LeverAgent, CAPTCHA_INDICATORS};
use autoapply::adapters::artifacts::FilesystemArtifactStore;
use autoapply::adapters::browser::{ScriptedBrowser, ScriptedRun};
use autoapply::domain::models::{
    AgentOutcome, AgentResult, ApplicationTask, AuditStep, FailureKind, JobSource, TaskStatus,
};
use autoapply::domain::ports::{Agent, ApplyRequest, AuditRepository};
use autoapply::services::{AuditTrail, ExecutionReport, RetryPolicy};

use common::{immediate_retries, permissive_admission, registry_of, Fixture, ScriptedAgent};

proptest! {
    /// However many transient failures occur, a task never uses more
    /// retries than the ceiling before it fails permanently.
    #[test]
    fn prop_attempts_never_exceed_ceiling(max_retries in 0u32..8, failures in 0usize..20) {
        let policy = RetryPolicy::new(max_retries, 1_000, 60_000);
        let mut task = ApplicationTask::new(Uuid::new_v4(), Uuid::new_v4());

        for attempt in 0..=failures {
            task.start_attempt("prop-worker").unwrap();
            let fails = attempt < failures;
            if !fails {
                task.transition_to(TaskStatus::Submitted).unwrap();
                break;
            }
            if policy.allows_retry(task.attempt_count) {
                task.fail(TaskStatus::Failed, "timeout").unwrap();
                task.transition_to(TaskStatus::Queued).unwrap();
            } else {
                task.fail(TaskStatus::FailedPermanent, "timeout").unwrap();
                break;
            }
            prop_assert!(task.retries_used() <= max_retries);
        }

        prop_assert!(task.is_terminal());
        prop_assert!(task.retries_used() <= max_retries);
        if failures as u32 > max_retries {
            prop_assert_eq!(task.status, TaskStatus::FailedPermanent);
            prop_assert_eq!(task.attempt_count, max_retries + 1);
        } else {
            prop_assert_eq!(task.status, TaskStatus::Submitted);
        }
    }

    /// Backoff stays within the cap for any attempt, with or without jitter.
    #[test]
    fn prop_backoff_is_capped(attempt in 0u32..64, jitter in 0.0f64..1.0) {
        let policy = RetryPolicy::new(5, 30_000, 1_800_000).with_jitter(jitter);
        prop_assert!(policy.backoff(attempt) <= Duration::from_millis(1_800_000));
    }
}

#[tokio::test]
async fn captcha_always_precedes_form_interaction() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new().await;
    let settings = AgentSettings {
        submit_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
    };

    for indicator in CAPTCHA_INDICATORS {
        let page = format!("<html><body><div>{indicator}</div><form></form></body></html>");
        let run = ScriptedRun::page(page).with_elements([
            "#first_name",
            "#last_name",
            "#email",
            "#phone",
            "input[name=name]",
            "input[name=email]",
            "input[type=file]#resume",
            "input[type=file]",
            "#submit_app",
            "button[type=submit]",
        ]);
        let browser = Arc::new(ScriptedBrowser::new(run));
        let artifacts = Arc::new(FilesystemArtifactStore::new(dir.path()));

        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(GreenhouseAgent::new(browser.clone(), artifacts.clone(), settings)),
            Box::new(LeverAgent::new(browser.clone(), artifacts.clone(), settings)),
            Box::new(GenericAgent::new(browser.clone(), artifacts, settings)),
        ];

        for agent in agents {
            let task_id = Uuid::new_v4();
            let trail = AuditTrail::open(fixture.audit.clone(), task_id, 1).await.unwrap();
            let request = ApplyRequest {
                task_id,
                apply_url: "https://careers.example.com/apply/1",
                profile: &fixture.profile,
                resume: fixture.profile.resume_file_reference.as_deref(),
            };

            let result = agent.apply(request, &trail).await;
            assert_eq!(
                result.outcome,
                AgentOutcome::CaptchaDetected,
                "{} missed indicator {indicator}",
                agent.name()
            );

            let entries = fixture.audit.list_for_task(task_id).await.unwrap();
            assert!(
                !entries.iter().any(|e| e.step.is_form_interaction()),
                "{} interacted with the form despite {indicator}",
                agent.name()
            );
            assert!(entries.iter().any(|e| e.step == AuditStep::CaptchaDetected));
        }

        for session in browser.sessions().await {
            assert!(session.filled.is_empty());
            assert!(session.uploads.is_empty());
            assert!(session.clicks.is_empty());
        }
    }
}

#[tokio::test]
async fn audit_trail_is_ordered_across_attempts() {
    let fixture = Fixture::new().await;
    let agent = Arc::new(ScriptedAgent::new(
        [
            AgentResult::failure(FailureKind::Network, "connection reset"),
            AgentResult::failure(FailureKind::Timeout, "navigation timed out"),
        ],
        AgentResult::submitted(),
    ));
    let executor = fixture.executor(
        registry_of(agent),
        &permissive_admission(1),
        immediate_retries(5),
    );
    let scheduler = fixture.scheduler(executor, 1);

    let task = fixture
        .queue(JobSource::Greenhouse, "https://boards.greenhouse.io/acme/jobs/9")
        .await;
    scheduler.run_until_idle().await.unwrap();

    let entries = fixture.audit.list_for_task(task.id).await.unwrap();
    assert!(entries.len() >= 6);
    for pair in entries.windows(2) {
        assert!(pair[0].sequence < pair[1].sequence);
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }

    let attempts: Vec<u32> = entries
        .iter()
        .filter(|e| e.step == AuditStep::Dispatch)
        .map(|e| e.attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test]
async fn execute_is_a_noop_once_terminal() {
    let fixture = Fixture::new().await;
    let agent = Arc::new(ScriptedAgent::always(AgentResult::submitted()));
    let executor = fixture.executor(
        registry_of(agent.clone()),
        &permissive_admission(1),
        immediate_retries(5),
    );

    let task = fixture
        .queue(JobSource::Lever, "https://jobs.lever.co/acme/1")
        .await;
    let first = executor.execute(task.id, "worker-a").await.unwrap();
    assert_eq!(
        first,
        ExecutionReport::Completed {
            status: TaskStatus::Submitted,
            attempt: 1
        }
    );
    let audit_len = fixture.audit.list_for_task(task.id).await.unwrap().len();

    for _ in 0..3 {
        let again = executor.execute(task.id, "worker-b").await.unwrap();
        assert_eq!(
            again,
            ExecutionReport::Skipped {
                status: TaskStatus::Submitted
            }
        );
    }

    assert_eq!(agent.calls(), 1);
    assert_eq!(fixture.audit.list_for_task(task.id).await.unwrap().len(), audit_len);
    assert_eq!(fixture.notifier.events().await.len(), 1);
    assert_eq!(fixture.reload(task.id).await.attempt_count, 1);
}
