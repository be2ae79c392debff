pub mod cycle;
pub mod scheduler;

use tokio::sync::watch;

pub use cycle::{CyclePhase, CycleReport, Monitor, MonitorStatus};
pub use scheduler::Scheduler;

/// True once shutdown has been signalled on the channel
pub fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}
