//! Per-socket service step: one non-blocking read, then parser dispatch
//! for the task's current stage, re-entering while a stage boundary
//! leaves buffered bytes behind, then buffer compaction.

use std::io;

use crate::error::TaskError;
use crate::response::{self, ParseProgress};
use crate::task::{Stage, Task};

/// What one service step did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ServiceOutcome {
    /// The socket had no data after all; try again next readiness round.
    NotReady,
    /// Bytes were read and parsed; the task stays in Downloading.
    Progress,
    /// Clean end of stream; the task is done and ready to retire.
    Finished,
}

pub(super) fn service_ready(task: &mut Task) -> Result<ServiceOutcome, TaskError> {
    // First data after the request promotes the task into parsing.
    if task.stage <= Stage::SendRequest {
        task.stage = Stage::ParseStatusLine;
    }

    if task.buf.free_tail() < task.buf.capacity() / 2 {
        tracing::debug!(
            "{}: receive window down to {} free bytes",
            task.parts.local,
            task.buf.free_tail()
        );
    }
    if task.buf.fill_space().is_empty() {
        // Compaction ran after the last parse and still could not free
        // the tail: nothing can make this task progress.
        return Err(match task.stage {
            Stage::RecvContent => TaskError::Write(io::Error::other(
                "output stalled with a full receive window",
            )),
            _ => TaskError::InvalidResponse("response head exceeds buffer capacity".into()),
        });
    }

    let n = {
        let socket = task
            .socket
            .as_ref()
            .ok_or_else(|| TaskError::Internal("service step without a socket".into()))?;
        match socket.try_read(task.buf.fill_space()) {
            Ok(0) => return finish_stream(task),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(ServiceOutcome::NotReady)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                return Ok(ServiceOutcome::NotReady)
            }
            Err(e) => return Err(TaskError::Read(e)),
        }
    };
    task.buf.commit(n);

    loop {
        let progress = match task.stage {
            Stage::ParseStatusLine => response::parse_status_line(task)?,
            Stage::ParseHeader => response::parse_headers(task)?,
            Stage::RecvContent => {
                response::recv_content(task)?;
                ParseProgress::NeedMore
            }
            stage => {
                return Err(TaskError::Internal(format!(
                    "socket readable in stage {stage:?}"
                )))
            }
        };
        if progress == ParseProgress::NeedMore {
            break;
        }
    }

    task.buf.compact();
    Ok(ServiceOutcome::Progress)
}

/// Zero-byte read: the server closed cleanly. Flush whatever body bytes
/// are still buffered, then make the file durable before retiring.
fn finish_stream(task: &mut Task) -> Result<ServiceOutcome, TaskError> {
    if task.stage == Stage::RecvContent {
        response::recv_content(task)?;
    } else {
        // Stream ended mid-head; nothing buffered is body data.
        task.buf.clear();
    }

    if let Some(out) = task.output.as_ref() {
        out.sync().map_err(TaskError::Fsync)?;
    }
    Ok(ServiceOutcome::Finished)
}
