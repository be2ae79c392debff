use chrono::{DateTime, Utc};

use crate::config::ConfigError;

/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid credentials: {0}")]
    AuthInvalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("Monthly quota exhausted until {resets_at}")]
    Exhausted { resets_at: DateTime<Utc> },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl AppError {
    /// Errors that must halt the process rather than degrade to the next cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::AuthInvalid(_))
    }

    /// Short machine-friendly label used in logs and cycle reports
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::AuthInvalid(_) => "auth_invalid",
            AppError::NotFound(_) => "not_found",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Exhausted { .. } => "exhausted",
            AppError::Transient(_) | AppError::Http(_) => "transient",
            AppError::Delivery(_) => "delivery",
        }
    }
}

/// Result type alias used throughout the crate
pub type AppResult<T> = Result<T, AppError>;
