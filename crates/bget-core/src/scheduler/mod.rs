//! Readiness-driven scheduler for a batch of downloads.
//!
//! One logical thread of control drives every transfer: a drain pass
//! sends requests for everything in Initial, then the drive loop waits
//! for readiness across the whole Downloading set, services each ready
//! socket through the response parser, and retires tasks into Finished.
//! No task state is ever touched concurrently, so there is no locking.

mod drive;
mod service;
#[cfg(test)]
mod tests;

use std::time::Duration;

use crate::error::BatchError;
use crate::queue::Batch;
use crate::request;

/// Scheduler knobs. The file-backed configuration maps onto this; tests
/// construct it directly with short timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Upper bound on one readiness wait.
    pub read_timeout: Duration,
    /// Consecutive empty waits tolerated before the whole batch aborts.
    pub timeout_retries: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            timeout_retries: 5,
        }
    }
}

/// Run the batch to completion: drain Initial, then drive Downloading
/// until it empties or an abort condition fires. Tasks that could not be
/// started stay in Initial and show up in the final report.
pub async fn run_batch(batch: &mut Batch, opts: &RunOptions) -> Result<(), BatchError> {
    drain_initial(batch).await;
    drive::drive_downloading(batch, opts).await
}

/// One pass over Initial: connect and send for each task. Success moves
/// the task to Downloading; failure logs and re-inserts it at the back
/// of Initial for a later pass.
async fn drain_initial(batch: &mut Batch) {
    let pending = batch.initial.len();
    for _ in 0..pending {
        let Some(mut task) = batch.initial.pop() else {
            break;
        };
        match request::connect_and_send(&mut task).await {
            Ok(()) => batch.downloading.push(task),
            Err(e) => {
                tracing::warn!("{}: {} (still queued)", task.parts.url, e);
                batch.initial.push(task);
            }
        }
    }
}
