// tempo-timeline: Scheduler error types

use thiserror::Error;

/// Environmental failures surfaced to the caller.
///
/// Programmer errors — scheduling on a scheduler that was explicitly
/// stopped — panic instead of returning a variant.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// The OS refused to spawn the background worker thread. The
    /// scheduler stays usable; `exec` may be retried.
    #[error("background worker failed to spawn: {0}")]
    WorkerSpawn(String),

    /// A listener panicked on the background worker. The worker is gone
    /// and the scheduler no longer accepts work.
    #[error("scheduler poisoned by a panicking listener")]
    Poisoned,
}
