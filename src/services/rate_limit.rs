//! Local pacing of outbound upstream calls.
//!
//! Three limits are enforced before any call leaves the process: a minimum
//! spacing between calls, a sliding window capacity and a monthly post quota.
//! An upstream 429 additionally imposes a penalty cooldown through
//! [`RateLimiter::penalize`].

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::clock::{add_saturating, to_chrono, to_std, Clock};
use crate::config::RateLimitConfig;
use crate::error::{AppError, AppResult};

/// Length of one quota period
pub const QUOTA_PERIOD_DAYS: i64 = 30;

pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    /// Timestamps of accepted calls inside the sliding window, oldest first
    window: VecDeque<DateTime<Utc>>,
    monthly_calls: u64,
    period_start: DateTime<Utc>,
    last_call: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
}

/// Point-in-time view of the limiter for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub window_used: usize,
    pub window_capacity: usize,
    pub monthly_calls: u64,
    pub monthly_posts_used: u64,
    pub monthly_post_limit: u64,
    pub period_start: DateTime<Utc>,
    pub period_resets_at: DateTime<Utc>,
    pub next_call_at: Option<DateTime<Utc>>,
}

impl LimiterState {
    /// Earliest time the spacing rules allow another call
    fn ready_at(&self, min_interval: std::time::Duration) -> Option<DateTime<Utc>> {
        let spacing = self.last_call.map(|t| add_saturating(t, min_interval));
        match (spacing, self.cooldown_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn period_resets_at(&self) -> DateTime<Utc> {
        self.period_start
            .checked_add_signed(Duration::days(QUOTA_PERIOD_DAYS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn purge(&mut self, now: DateTime<Utc>, window: Duration) {
        while let Some(&oldest) = self.window.front() {
            if now - oldest >= window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let period_start = clock.now();
        Self {
            config,
            clock,
            state: Mutex::new(LimiterState {
                window: VecDeque::new(),
                monthly_calls: 0,
                period_start,
                last_call: None,
                cooldown_until: None,
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Waits until a call may be made and records it, or fails with
    /// `Exhausted` when the monthly quota is used up for the current period.
    ///
    /// The lock is held across every wait, so concurrent acquirers queue up
    /// and the check-then-record step can never interleave.
    pub async fn acquire(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let min_interval = self.config.min_interval;
        let window = to_chrono(self.config.window);
        let capacity = self.config.window_capacity.max(1);
        let period = Duration::days(QUOTA_PERIOD_DAYS);

        loop {
            let now = self.clock.now();

            if let Some(ready_at) = state.ready_at(min_interval) {
                if now < ready_at {
                    log::debug!(
                        "Rate limiter: spacing calls, waiting {}s",
                        (ready_at - now).num_seconds()
                    );
                    self.clock.sleep(to_std(ready_at - now)).await;
                    continue;
                }
            }

            if now - state.period_start >= period {
                log::info!(
                    "Rate limiter: quota period rolled over after {} calls",
                    state.monthly_calls
                );
                state.monthly_calls = 0;
                state.period_start = now;
            }

            let used = state
                .monthly_calls
                .saturating_mul(self.config.posts_per_call);
            if used >= self.config.monthly_post_limit {
                let resets_at = state.period_resets_at();
                log::warn!(
                    "Rate limiter: monthly quota exhausted ({}/{} posts), resets at {}",
                    used,
                    self.config.monthly_post_limit,
                    resets_at
                );
                return Err(AppError::Exhausted { resets_at });
            }

            state.purge(now, window);
            if state.window.len() >= capacity {
                if let Some(&oldest) = state.window.front() {
                    let wait = add_saturating(oldest, self.config.window) - now;
                    log::info!(
                        "Rate limiter: window full ({}/{}), waiting {}s",
                        state.window.len(),
                        capacity,
                        wait.num_seconds()
                    );
                    self.clock.sleep(to_std(wait)).await;
                    continue;
                }
            }

            state.window.push_back(now);
            state.monthly_calls += 1;
            state.last_call = Some(now);
            return Ok(());
        }
    }

    /// Pushes the next allowed call out by the penalty cooldown after the
    /// upstream rejected a call with 429.
    pub async fn penalize(&self) {
        let mut state = self.state.lock().await;
        let until = add_saturating(self.clock.now(), self.config.penalty);
        state.cooldown_until = Some(state.cooldown_until.map_or(until, |c| c.max(until)));
        log::warn!("Rate limiter: upstream rejected a call, cooling down until {}", until);
    }

    pub async fn snapshot(&self) -> RateLimitSnapshot {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        state.purge(now, to_chrono(self.config.window));

        let next_call_at = state
            .ready_at(self.config.min_interval)
            .filter(|t| *t > now);

        RateLimitSnapshot {
            window_used: state.window.len(),
            window_capacity: self.config.window_capacity,
            monthly_calls: state.monthly_calls,
            monthly_posts_used: state
                .monthly_calls
                .saturating_mul(self.config.posts_per_call),
            monthly_post_limit: self.config.monthly_post_limit,
            period_start: state.period_start,
            period_resets_at: state.period_resets_at(),
            next_call_at,
        }
    }
}
