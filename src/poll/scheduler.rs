use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::{shutdown_requested, Monitor};
use crate::error::AppResult;

/// Runs the monitor immediately, then once per interval, until shutdown or a
/// fatal error.
pub struct Scheduler {
    monitor: Arc<Monitor>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(monitor: Arc<Monitor>, interval: Duration) -> Self {
        Self { monitor, interval }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let clock = self.monitor.clock();

        loop {
            if let Err(e) = self.monitor.run_cycle(&shutdown).await {
                if e.is_fatal() {
                    log::error!("Stopping poller: {}", e);
                    return Err(e);
                }
                log::error!("Poll cycle failed: {}", e);
            }

            if shutdown_requested(&shutdown) {
                log::info!("Poller stopped");
                return Ok(());
            }

            log::debug!("Next poll cycle in {}s", self.interval.as_secs());
            tokio::select! {
                _ = clock.sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means nobody can keep us running
                    if changed.is_err() || shutdown_requested(&shutdown) {
                        log::info!("Poller stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}
