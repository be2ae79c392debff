//! Notification sinks.
//!
//! The poll cycle hands every finalized new post to a [`NotificationSink`].
//! Sinks report failures back as `AppError::Delivery`; nothing is retried.

pub mod discord;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::PostNotification;

pub use discord::DiscordNotifier;

// =============================================================================
// Notification Sink Trait
// =============================================================================

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification to the destination
    async fn deliver(&self, notification: &PostNotification) -> AppResult<()>;

    /// Check that the destination is reachable with the configured credentials.
    ///
    /// Invalid credentials come back as `AuthInvalid`; a missing or forbidden
    /// destination as `Delivery`.
    async fn verify(&self) -> AppResult<()> {
        Ok(())
    }
}
