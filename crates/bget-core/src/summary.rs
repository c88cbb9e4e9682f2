//! End-of-run report: per-queue listing with byte counts and rates.

use crate::queue::{Batch, TaskQueue};
use crate::task::Task;

/// Render the whole batch, one block per queue.
pub fn render(batch: &Batch) -> String {
    let mut out = String::new();
    for queue in [&batch.initial, &batch.downloading, &batch.finished] {
        render_queue(&mut out, queue);
    }
    out.push_str("--------------\n");
    out
}

fn render_queue(out: &mut String, queue: &TaskQueue) {
    out.push_str(&format!("\n{} [{}]:\n", queue.name(), queue.len()));
    for task in queue.iter() {
        out.push_str(&render_task(task));
        out.push('\n');
    }
}

fn render_task(task: &Task) -> String {
    let mut line = if task.bytes_received == 0 && task.elapsed.is_none() {
        // Never got going; the URL is the most useful identifier.
        format!("\t{}", task.parts.url)
    } else {
        let base = format!(
            "\t{} [{} B/{} B], restart[{} B], total[{} B]",
            task.parts.local,
            task.bytes_received,
            task.content_length,
            task.restart_offset,
            task.total_length
        );
        match task.elapsed {
            // Rate in KB/s: bytes over milliseconds.
            Some(elapsed) => format!(
                "{} [{} KB/s]",
                base,
                task.bytes_received / (elapsed.as_millis() as u64).max(1)
            ),
            None => base,
        }
    };
    if let Some(err) = &task.error {
        line.push_str(&format!(" error: {err}"));
    }
    line
}
