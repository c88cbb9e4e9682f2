//! The drive loop: wait for readiness, service ready sockets, retire
//! finished tasks, enforce the consecutive-timeout budget.

use std::time::Duration;

use futures::future;

use crate::error::BatchError;
use crate::queue::{Batch, TaskQueue};

use super::service::{service_ready, ServiceOutcome};
use super::RunOptions;

/// Drive the Downloading queue until it empties or the batch aborts.
///
/// The timeout counter is global: any readiness anywhere in the set
/// resets it, and only a fully idle batch can exhaust the budget. A
/// batch-fatal task error (hard socket read failure) aborts everything;
/// remaining tasks are left in Downloading for the report.
pub(super) async fn drive_downloading(
    batch: &mut Batch,
    opts: &RunOptions,
) -> Result<(), BatchError> {
    let mut consecutive_timeouts = 0u32;

    while !batch.downloading.is_empty() {
        if !wait_any_readable(&batch.downloading, opts.read_timeout).await {
            consecutive_timeouts += 1;
            tracing::debug!(
                "readiness wait timed out ({}/{})",
                consecutive_timeouts,
                opts.timeout_retries
            );
            if consecutive_timeouts > opts.timeout_retries {
                return Err(BatchError::TimeoutBudget {
                    consecutive: consecutive_timeouts,
                });
            }
            continue;
        }
        consecutive_timeouts = 0;

        // Service pass: every socket with buffered data makes progress;
        // the rest report not-ready and are skipped.
        let mut i = 0;
        while i < batch.downloading.len() {
            let task = batch.downloading.get_mut(i).expect("index within queue");
            match service_ready(task) {
                Ok(ServiceOutcome::NotReady) | Ok(ServiceOutcome::Progress) => i += 1,
                Ok(ServiceOutcome::Finished) => {
                    let mut task = batch.downloading.remove(i).expect("index within queue");
                    task.finish();
                    tracing::info!(
                        "{}: finished, {} bytes this run",
                        task.parts.local,
                        task.bytes_received
                    );
                    batch.finished.push(task);
                }
                Err(e) if e.is_batch_fatal() => {
                    let url = task.parts.url.clone();
                    tracing::error!("{}: {}; aborting batch", url, e);
                    return Err(BatchError::Task { url, source: e });
                }
                Err(e) => {
                    let mut task = batch.downloading.remove(i).expect("index within queue");
                    task.fail(e);
                    batch.finished.push(task);
                }
            }
        }
    }

    tracing::info!("all transfers finished");
    Ok(())
}

/// Wait until at least one Downloading socket is readable, bounded by
/// `timeout`. Returns false only on a timeout with nothing ready.
/// Readiness errors count as ready: the following `try_read` surfaces
/// the real error with task context attached.
async fn wait_any_readable(queue: &TaskQueue, timeout: Duration) -> bool {
    let waits: Vec<_> = queue
        .iter()
        .filter_map(|t| t.socket.as_ref())
        .map(|s| Box::pin(s.readable()))
        .collect();
    if waits.is_empty() {
        return true;
    }

    match tokio::time::timeout(timeout, future::select_all(waits)).await {
        Err(_) => false,
        Ok((result, _, _)) => {
            if let Err(e) = result {
                tracing::debug!("readiness wait reported: {}", e);
            }
            true
        }
    }
}
