//! One check pass across every monitored account.
//!
//! `Idle -> Resolving -> Checking -> Idle`. Per-account failures are isolated:
//! a failing account is logged (and suspended or deactivated where the error
//! calls for it) and the cycle moves on. Only `AuthInvalid` ends the cycle with
//! an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use super::shutdown_requested;
use crate::clock::{add_saturating, Clock};
use crate::config::PollConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Account, AccountStatus, PostNotification};
use crate::services::{NotificationSink, RateLimitSnapshot, RateLimiter, TweetSource, WatermarkStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Resolving,
    Checking,
}

/// Outcome of one cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub resolved: usize,
    pub checked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    /// Monthly quota ran out; remaining calls were skipped
    pub exhausted: bool,
    /// Shutdown was requested between two accounts
    pub cancelled: bool,
}

/// Status snapshot for operators
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub phase: CyclePhase,
    pub cycles: u64,
    pub accounts: Vec<Account>,
    pub watermarks: BTreeMap<String, String>,
    pub last_report: Option<CycleReport>,
    pub rate_limit: Option<RateLimitSnapshot>,
}

struct MonitorState {
    accounts: Vec<Account>,
    watermarks: WatermarkStore,
    cycles: u64,
    last_report: Option<CycleReport>,
}

enum Flow {
    Continue,
    Stop,
}

pub struct Monitor {
    source: Arc<dyn TweetSource>,
    sink: Arc<dyn NotificationSink>,
    limiter: Option<Arc<RateLimiter>>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
    max_results: u32,
    phase: std::sync::Mutex<CyclePhase>,
    state: Mutex<MonitorState>,
}

impl Monitor {
    pub fn new(
        usernames: &[String],
        source: Arc<dyn TweetSource>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: PollConfig,
        max_results: u32,
    ) -> Self {
        Self {
            source,
            sink,
            limiter: None,
            clock,
            config,
            max_results,
            phase: std::sync::Mutex::new(CyclePhase::Idle),
            state: Mutex::new(MonitorState {
                accounts: usernames.iter().map(Account::new).collect(),
                watermarks: WatermarkStore::new(),
                cycles: 0,
                last_report: None,
            }),
        }
    }

    /// Limiter to penalize on upstream 429 and to include in status output
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Runs one full cycle. Concurrent callers (a manual trigger next to the
    /// scheduled loop) queue on the state lock and run one after the other.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> AppResult<CycleReport> {
        let mut guard = self.state.lock().await;
        let MonitorState {
            accounts,
            watermarks,
            cycles,
            last_report,
        } = &mut *guard;

        *cycles += 1;
        let mut report = CycleReport {
            started_at: Some(self.clock.now()),
            ..Default::default()
        };
        log::info!("Poll cycle #{} started ({} account(s))", cycles, accounts.len());

        let result = self
            .resolve_and_check(accounts, watermarks, &mut report, shutdown)
            .await;
        self.set_phase(CyclePhase::Idle);
        report.finished_at = Some(self.clock.now());

        match result {
            Ok(()) => {
                log::info!(
                    "Poll cycle #{} finished: checked={} skipped={} failed={} delivered={} delivery_failures={}{}{}",
                    cycles,
                    report.checked,
                    report.skipped,
                    report.failed,
                    report.delivered,
                    report.delivery_failures,
                    if report.exhausted { " (quota exhausted)" } else { "" },
                    if report.cancelled { " (cancelled)" } else { "" },
                );
                *last_report = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                log::error!("Poll cycle #{} aborted: {}", cycles, e);
                *last_report = Some(report);
                Err(e)
            }
        }
    }

    async fn resolve_and_check(
        &self,
        accounts: &mut [Account],
        watermarks: &mut WatermarkStore,
        report: &mut CycleReport,
        shutdown: &watch::Receiver<bool>,
    ) -> AppResult<()> {
        let mut calls_made = false;

        self.set_phase(CyclePhase::Resolving);
        for account in accounts.iter_mut() {
            if account.status != AccountStatus::Pending {
                continue;
            }
            if shutdown_requested(shutdown) {
                report.cancelled = true;
                return Ok(());
            }
            if account.is_suspended(self.clock.now()) {
                continue;
            }
            if calls_made {
                self.clock.sleep(self.config.account_pause).await;
            }
            calls_made = true;

            match self.source.resolve_account_id(&account.username).await {
                Ok(user_id) => {
                    log::info!("Resolved @{} to id {}", account.username, user_id);
                    account.mark_resolved(user_id);
                    report.resolved += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    let flow = self
                        .handle_account_error(account, e, CyclePhase::Resolving, report)
                        .await?;
                    if let Flow::Stop = flow {
                        return Ok(());
                    }
                }
            }
        }

        self.set_phase(CyclePhase::Checking);
        for account in accounts.iter_mut() {
            if account.status != AccountStatus::Active {
                continue;
            }
            if shutdown_requested(shutdown) {
                report.cancelled = true;
                return Ok(());
            }
            if account.is_suspended(self.clock.now()) {
                log::debug!(
                    "Skipping @{}: suspended until {:?}",
                    account.username,
                    account.suspended_until
                );
                report.skipped += 1;
                continue;
            }
            let Some(user_id) = account.user_id.clone() else {
                continue;
            };
            if calls_made {
                self.clock.sleep(self.config.account_pause).await;
            }
            calls_made = true;

            match self
                .source
                .fetch_recent_posts(&user_id, &account.username, self.max_results)
                .await
            {
                Ok(posts) => {
                    report.checked += 1;
                    let fresh = watermarks.apply(&account.username, &posts);
                    if fresh.is_empty() {
                        log::debug!("@{}: nothing new", account.username);
                    }
                    for (i, post) in fresh.iter().enumerate() {
                        if i > 0 {
                            self.clock.sleep(self.config.post_pause).await;
                        }
                        log::info!("New post from @{}: {}", account.username, post.url());
                        match self.sink.deliver(&PostNotification::from(post)).await {
                            Ok(()) => report.delivered += 1,
                            Err(e) => {
                                report.delivery_failures += 1;
                                log::error!(
                                    "Failed to deliver post {} from @{}: {}",
                                    post.id,
                                    account.username,
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    let flow = self
                        .handle_account_error(account, e, CyclePhase::Checking, report)
                        .await?;
                    if let Flow::Stop = flow {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }

    /// Applies the failure policy for one account. Fatal errors are returned.
    ///
    /// Only a failed username lookup retires an account; a missing timeline is
    /// retried next cycle like any other upstream hiccup.
    async fn handle_account_error(
        &self,
        account: &mut Account,
        error: AppError,
        phase: CyclePhase,
        report: &mut CycleReport,
    ) -> AppResult<Flow> {
        match error {
            e if e.is_fatal() => Err(e),
            AppError::NotFound(reason) if phase == CyclePhase::Resolving => {
                log::warn!(
                    "@{} not found ({}); excluding it for this session",
                    account.username,
                    reason
                );
                account.mark_inactive();
                Ok(Flow::Continue)
            }
            AppError::RateLimited(reason) => {
                let until = add_saturating(self.clock.now(), self.config.suspension);
                log::warn!(
                    "@{} rate limited ({}); suspended until {}",
                    account.username,
                    reason,
                    until
                );
                account.suspend_until(until);
                if let Some(limiter) = &self.limiter {
                    limiter.penalize().await;
                }
                Ok(Flow::Continue)
            }
            AppError::Exhausted { resets_at } => {
                log::warn!(
                    "Quota exhausted while checking @{}; skipping the rest of this cycle (resets at {})",
                    account.username,
                    resets_at
                );
                report.exhausted = true;
                Ok(Flow::Stop)
            }
            e => {
                log::warn!(
                    "Check of @{} failed ({}): {}; retrying next cycle",
                    account.username,
                    e.kind(),
                    e
                );
                Ok(Flow::Continue)
            }
        }
    }

    /// Snapshot of accounts, watermarks and limiter usage
    pub async fn status(&self) -> MonitorStatus {
        let phase = self.phase();
        let (accounts, watermarks, cycles, last_report) = {
            let state = self.state.lock().await;
            (
                state.accounts.clone(),
                state.watermarks.to_map(),
                state.cycles,
                state.last_report.clone(),
            )
        };
        let rate_limit = match &self.limiter {
            Some(limiter) => Some(limiter.snapshot().await),
            None => None,
        };

        MonitorStatus {
            phase,
            cycles,
            accounts,
            watermarks,
            last_report,
            rate_limit,
        }
    }
}
