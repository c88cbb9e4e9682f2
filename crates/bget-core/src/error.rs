//! Typed errors for task and batch failure classification.
//!
//! Per-task errors end one task; a batch error ends the whole run. The
//! scheduler asks `TaskError::is_batch_fatal` to decide which is which.

use std::io;
use thiserror::Error;

/// Error that terminates a single download task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Bad input: URL part, argument, or request that cannot be formed.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// TCP connect to the remote host failed.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// Socket read failed hard (not would-block, not EOF).
    #[error("socket read failed: {0}")]
    Read(#[source] io::Error),

    /// Sending the request failed.
    #[error("request write failed: {0}")]
    Write(#[source] io::Error),

    /// Syncing the output file to disk failed.
    #[error("fsync failed: {0}")]
    Fsync(#[source] io::Error),

    /// The response violates the HTTP grammar this client accepts.
    #[error("malformed response: {0}")]
    InvalidResponse(String),

    /// A parser was invoked in a stage it does not handle.
    #[error("internal state error: {0}")]
    Internal(String),
}

impl TaskError {
    /// True if this error must stop the entire batch rather than just the
    /// failing task. Hard socket read errors abort everything; the rest is
    /// isolated per task. Kept in one place so the policy can change without
    /// touching the scheduler loop.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, TaskError::Read(_))
    }
}

/// Error that aborts the whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The readiness wait timed out too many times in a row with no socket
    /// ready. Blunt liveness guard; the per-iteration timeout and the retry
    /// budget come from configuration.
    #[error("readiness wait timed out {consecutive} times in a row, giving up")]
    TimeoutBudget { consecutive: u32 },

    /// A task hit a batch-fatal error (see `TaskError::is_batch_fatal`).
    #[error("batch aborted on {url}: {source}")]
    Task {
        url: String,
        #[source]
        source: TaskError,
    },
}
