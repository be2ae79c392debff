use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of a monitored account within one process run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// User id not resolved yet
    Pending,
    /// Resolved and polled every cycle
    Active,
    /// Upstream reported the account missing; excluded until reconfigured
    Inactive,
}

/// A monitored account
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub username: String,
    pub user_id: Option<String>,
    pub status: AccountStatus,
    /// Skip polling until this time (set after an upstream 429)
    pub suspended_until: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_id: None,
            status: AccountStatus::Pending,
            suspended_until: None,
        }
    }

    pub fn mark_resolved(&mut self, user_id: String) {
        self.user_id = Some(user_id);
        self.status = AccountStatus::Active;
    }

    pub fn mark_inactive(&mut self) {
        self.status = AccountStatus::Inactive;
    }

    pub fn suspend_until(&mut self, until: DateTime<Utc>) {
        self.suspended_until = Some(until);
    }

    /// True while a suspension is running. An expired suspension is cleared.
    pub fn is_suspended(&mut self, now: DateTime<Utc>) -> bool {
        match self.suspended_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.suspended_until = None;
                false
            }
            None => false,
        }
    }
}
