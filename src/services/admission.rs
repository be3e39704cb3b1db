//! Per-destination admission control.
//!
//! Every automation run against an ATS host must hold an [`AdmissionSlot`]
//! for that host. The controller enforces two ceilings per host, the number
//! of runs in flight and the number of admissions in a rolling 60 second
//! window, and tightens them when the host starts pushing back with CAPTCHAs
//! or 403s.
//!
//! Escalation uses a sliding strike window:
//! - `degrade_threshold` strikes: healthy -> degraded (rate ceiling scaled down)
//! - `block_threshold` strikes: -> blocked (acquisitions rejected until cooldown)
//! - cooldown elapsed: blocked -> degraded
//! - strike window empty: degraded -> healthy
//!
//! All host state lives in one table behind a single mutex that is never held
//! across an await point. Waiters for a host are served in arrival order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::models::{
    AdmissionConfig, AdmissionMode, AgentOutcome, AgentResult, Domain, DomainStatus,
    FailureKind, RateLimitPolicy,
};

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Why an acquisition was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionRejected {
    #[error("Host {host} is blocked, retry after {retry_after:?}")]
    Blocked { host: String, retry_after: Duration },

    #[error("Host {host} is at capacity")]
    AtCapacity { host: String },

    #[error("Timed out after {waited:?} waiting for host {host}")]
    TimedOut { host: String, waited: Duration },
}

impl AdmissionRejected {
    pub fn host(&self) -> &str {
        match self {
            Self::Blocked { host, .. } | Self::AtCapacity { host } | Self::TimedOut { host, .. } => {
                host
            }
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Blocked { .. } => "blocked",
            Self::AtCapacity { .. } => "at_capacity",
            Self::TimedOut { .. } => "timed_out",
        }
    }

    /// Earliest time it makes sense to try again, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Blocked { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// What a finished run tells the controller about its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionSignal {
    Success,
    Captcha,
    Forbidden,
    Failure,
}

impl AdmissionSignal {
    pub fn from_result(result: &AgentResult) -> Self {
        match (result.outcome, result.failure) {
            (AgentOutcome::Submitted, _) => Self::Success,
            (AgentOutcome::CaptchaDetected, _) => Self::Captcha,
            (_, Some(FailureKind::Forbidden)) => Self::Forbidden,
            _ => Self::Failure,
        }
    }

    /// Whether the signal counts towards escalation.
    pub fn is_strike(&self) -> bool {
        matches!(self, Self::Captcha | Self::Forbidden)
    }
}

/// Runtime form of [`AdmissionConfig`].
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub default_policy: RateLimitPolicy,
    pub overrides: HashMap<String, RateLimitPolicy>,
    pub mode: AdmissionMode,
    pub acquire_timeout: Duration,
    pub strike_window: Duration,
    pub degrade_threshold: u32,
    pub block_threshold: u32,
    pub cooldown: Duration,
    pub degraded_rate_factor: f64,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self::from(&AdmissionConfig::default())
    }
}

impl From<&AdmissionConfig> for AdmissionSettings {
    fn from(config: &AdmissionConfig) -> Self {
        let overrides = config
            .domains
            .iter()
            .map(|d| {
                (
                    normalize_host(&d.host),
                    RateLimitPolicy {
                        requests_per_minute: d.requests_per_minute,
                        max_concurrent: d.max_concurrent,
                    },
                )
            })
            .collect();

        Self {
            default_policy: config.default_policy,
            overrides,
            mode: config.mode,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            strike_window: Duration::from_secs(config.strike_window_secs),
            degrade_threshold: config.degrade_threshold,
            block_threshold: config.block_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
            degraded_rate_factor: config.degraded_rate_factor,
        }
    }
}

impl AdmissionSettings {
    fn policy_for(&self, host: &str) -> RateLimitPolicy {
        self.overrides.get(host).copied().unwrap_or(self.default_policy)
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().to_lowercase()
}

enum Decision {
    Admit,
    /// Not admissible yet; re-check no later than the hint
    Wait(Option<Duration>),
    Blocked(Duration),
}

struct HostState {
    policy: RateLimitPolicy,
    status: DomainStatus,
    in_flight: u32,
    admissions: VecDeque<Instant>,
    strikes: VecDeque<Instant>,
    blocked_until: Option<Instant>,
    waiters: VecDeque<u64>,
    notify: Arc<Notify>,
}

impl HostState {
    fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            status: DomainStatus::Healthy,
            in_flight: 0,
            admissions: VecDeque::new(),
            strikes: VecDeque::new(),
            blocked_until: None,
            waiters: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Expire old admissions and strikes, and step status down when allowed.
    fn refresh(&mut self, host: &str, now: Instant, settings: &AdmissionSettings) {
        while self
            .admissions
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= RATE_WINDOW)
        {
            self.admissions.pop_front();
        }
        while self
            .strikes
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= settings.strike_window)
        {
            self.strikes.pop_front();
        }

        if self.status == DomainStatus::Blocked && self.blocked_until.map_or(true, |u| u <= now) {
            self.status = DomainStatus::Degraded;
            self.blocked_until = None;
            info!(host = %host, "cooldown elapsed, host degraded");
        }
        if self.status == DomainStatus::Degraded && self.strikes.is_empty() {
            self.status = DomainStatus::Healthy;
            info!(host = %host, "host recovered");
        }
    }

    fn effective_rpm(&self, settings: &AdmissionSettings) -> u32 {
        let rpm = self.policy.requests_per_minute;
        match self.status {
            DomainStatus::Degraded => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let scaled = (f64::from(rpm) * settings.degraded_rate_factor).floor() as u32;
                scaled.max(1)
            }
            _ => rpm.max(1),
        }
    }

    fn evaluate(&self, now: Instant, settings: &AdmissionSettings) -> Decision {
        if self.status == DomainStatus::Blocked {
            let retry_after = self
                .blocked_until
                .map_or(Duration::ZERO, |u| u.saturating_duration_since(now));
            return Decision::Blocked(retry_after);
        }

        if self.in_flight >= self.policy.max_concurrent.max(1) {
            return Decision::Wait(None);
        }

        let rpm = self.effective_rpm(settings) as usize;
        if self.admissions.len() >= rpm {
            // The oldest admission leaving the window frees the next unit.
            let oldest = self.admissions[self.admissions.len() - rpm];
            let free_at = oldest + RATE_WINDOW;
            return Decision::Wait(Some(free_at.saturating_duration_since(now)));
        }

        Decision::Admit
    }

    fn grant(&mut self, now: Instant) {
        self.in_flight += 1;
        self.admissions.push_back(now);
    }
}

#[derive(Default)]
struct HostTable {
    hosts: HashMap<String, HostState>,
    next_ticket: u64,
}

impl HostTable {
    fn host_mut(&mut self, host: &str, settings: &AdmissionSettings) -> &mut HostState {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(settings.policy_for(host)))
    }
}

struct Shared {
    settings: AdmissionSettings,
    table: Mutex<HostTable>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HostTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-host concurrency and rate gate shared by all workers.
#[derive(Clone)]
pub struct DomainAdmissionController {
    shared: Arc<Shared>,
}

impl DomainAdmissionController {
    pub fn new(settings: AdmissionSettings) -> Self {
        let mut table = HostTable::default();
        for (host, policy) in &settings.overrides {
            table.hosts.insert(host.clone(), HostState::new(*policy));
        }
        Self {
            shared: Arc::new(Shared {
                settings,
                table: Mutex::new(table),
            }),
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(AdmissionSettings::from(config))
    }

    pub fn settings(&self) -> &AdmissionSettings {
        &self.shared.settings
    }

    /// Acquire a slot for `host`.
    ///
    /// In wait mode the caller queues behind earlier waiters until admitted
    /// or the acquire timeout passes. In reject mode this fails immediately
    /// when the host has no capacity.
    pub async fn acquire(&self, host: &str) -> Result<AdmissionSlot, AdmissionRejected> {
        if self.shared.settings.mode == AdmissionMode::Reject {
            return self.try_acquire(host);
        }

        let settings = &self.shared.settings;
        let host = normalize_host(host);
        let started = Instant::now();
        let deadline = started + settings.acquire_timeout;

        let (ticket, notify) = {
            let mut table = self.shared.lock();
            let ticket = table.next_ticket;
            table.next_ticket += 1;
            let state = table.host_mut(&host, settings);
            state.waiters.push_back(ticket);
            (ticket, state.notify.clone())
        };
        let mut waiter = Waiter {
            shared: &self.shared,
            host: &host,
            ticket,
            queued: true,
        };

        loop {
            // Registered before checking so a release between the check and
            // the await still wakes us.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let decision = {
                let mut table = self.shared.lock();
                let state = table.host_mut(&host, settings);
                state.refresh(&host, now, settings);
                if state.waiters.front() == Some(&ticket) {
                    let decision = state.evaluate(now, settings);
                    if matches!(decision, Decision::Admit) {
                        state.waiters.pop_front();
                        state.grant(now);
                        // The next head may be admissible too.
                        state.notify.notify_waiters();
                    }
                    decision
                } else {
                    Decision::Wait(None)
                }
            };

            match decision {
                Decision::Admit => {
                    waiter.queued = false;
                    debug!(
                        host = %host,
                        waited_ms = now.saturating_duration_since(started).as_millis() as u64,
                        "admission granted"
                    );
                    return Ok(AdmissionSlot::new(self.shared.clone(), host.clone(), now));
                }
                Decision::Blocked(retry_after) => {
                    return Err(AdmissionRejected::Blocked {
                        host: host.clone(),
                        retry_after,
                    });
                }
                Decision::Wait(hint) => {
                    if now >= deadline {
                        warn!(host = %host, "admission timed out");
                        return Err(AdmissionRejected::TimedOut {
                            host: host.clone(),
                            waited: now.saturating_duration_since(started),
                        });
                    }
                    let wake_at = hint.map_or(deadline, |h| (now + h).min(deadline));
                    tokio::select! {
                        () = notified.as_mut() => {}
                        () = tokio::time::sleep_until(wake_at) => {}
                    }
                }
            }
        }
    }

    /// Acquire a slot without waiting.
    pub fn try_acquire(&self, host: &str) -> Result<AdmissionSlot, AdmissionRejected> {
        let settings = &self.shared.settings;
        let host = normalize_host(host);
        let now = Instant::now();

        let mut table = self.shared.lock();
        let state = table.host_mut(&host, settings);
        state.refresh(&host, now, settings);

        if !state.waiters.is_empty() {
            return Err(AdmissionRejected::AtCapacity { host });
        }

        match state.evaluate(now, settings) {
            Decision::Admit => {
                state.grant(now);
                drop(table);
                Ok(AdmissionSlot::new(self.shared.clone(), host, now))
            }
            Decision::Wait(_) => Err(AdmissionRejected::AtCapacity { host }),
            Decision::Blocked(retry_after) => Err(AdmissionRejected::Blocked { host, retry_after }),
        }
    }

    /// Give a slot back. Dropping the slot has the same effect.
    pub fn release(&self, slot: AdmissionSlot) {
        drop(slot);
    }

    /// Feed a run outcome into the host's escalation state and return the
    /// resulting status.
    pub fn report_outcome(&self, host: &str, signal: AdmissionSignal) -> DomainStatus {
        let settings = &self.shared.settings;
        let host = normalize_host(host);
        let now = Instant::now();

        let mut table = self.shared.lock();
        let state = table.host_mut(&host, settings);
        state.refresh(&host, now, settings);

        if signal.is_strike() {
            state.strikes.push_back(now);
            let strikes = u32::try_from(state.strikes.len()).unwrap_or(u32::MAX);
            let previous = state.status;

            if strikes >= settings.block_threshold {
                state.status = DomainStatus::Blocked;
                state.blocked_until = Some(now + settings.cooldown);
            } else if strikes >= settings.degrade_threshold && previous == DomainStatus::Healthy {
                state.status = DomainStatus::Degraded;
            }

            if state.status != previous {
                warn!(
                    host = %host,
                    from = %previous,
                    to = %state.status,
                    strikes,
                    "host status escalated"
                );
            }
        }

        state.notify.notify_waiters();
        state.status
    }

    /// Current status of a host; unknown hosts are healthy.
    pub fn status(&self, host: &str) -> DomainStatus {
        let host = normalize_host(host);
        let mut table = self.shared.lock();
        match table.hosts.get_mut(&host) {
            Some(state) => {
                state.refresh(&host, Instant::now(), &self.shared.settings);
                state.status
            }
            None => DomainStatus::Healthy,
        }
    }

    /// Runs currently holding a slot for `host`.
    pub fn in_flight(&self, host: &str) -> u32 {
        let host = normalize_host(host);
        self.shared.lock().hosts.get(&host).map_or(0, |s| s.in_flight)
    }

    /// Every known host, sorted by name.
    pub fn snapshot(&self) -> Vec<Domain> {
        let now = Instant::now();
        let settings = &self.shared.settings;
        let mut table = self.shared.lock();

        let mut domains: Vec<Domain> = table
            .hosts
            .iter_mut()
            .map(|(host, state)| {
                state.refresh(host, now, settings);
                Domain {
                    host: host.clone(),
                    rate_limit_policy: state.policy,
                    last_status: state.status,
                }
            })
            .collect();
        domains.sort_by(|a, b| a.host.cmp(&b.host));
        domains
    }
}

/// Queue position of a pending `acquire`. Dropping it (timeout, rejection or
/// a cancelled caller) leaves the queue.
struct Waiter<'a> {
    shared: &'a Shared,
    host: &'a str,
    ticket: u64,
    queued: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.queued {
            return;
        }
        let mut table = self.shared.lock();
        if let Some(state) = table.hosts.get_mut(self.host) {
            state.waiters.retain(|t| *t != self.ticket);
            state.notify.notify_waiters();
        }
    }
}

/// A held admission for one host, released on drop.
#[must_use = "dropping the slot releases it immediately"]
pub struct AdmissionSlot {
    shared: Arc<Shared>,
    host: String,
    acquired_at: Instant,
}

impl AdmissionSlot {
    fn new(shared: Arc<Shared>, host: String, acquired_at: Instant) -> Self {
        Self {
            shared,
            host,
            acquired_at,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for AdmissionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionSlot")
            .field("host", &self.host)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        let mut table = self.shared.lock();
        if let Some(state) = table.hosts.get_mut(&self.host) {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.notify.notify_waiters();
        }
        debug!(
            host = %self.host,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "admission released"
        );
    }
}
