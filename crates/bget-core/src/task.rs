//! Per-URL download state and the response stage machine.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::buffer::RecvBuffer;
use crate::error::TaskError;
use crate::storage::OutputFile;
use crate::url_model::UrlParts;

/// Position in the response state machine. Advances monotonically; the
/// two parse stages may be re-entered on the same buffer when a stage
/// completes with unconsumed bytes left over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    SendRequest,
    ParseStatusLine,
    ParseHeader,
    RecvContent,
    Finish,
}

/// Reason phrases longer than this are truncated.
pub const REASON_PHRASE_MAX: usize = 128;

/// Floor for the stamped elapsed time, so byte rates stay finite for
/// transfers that complete inside one clock tick.
const MIN_ELAPSED: Duration = Duration::from_millis(100);

/// One URL's end-to-end download state.
#[derive(Debug)]
pub struct Task {
    pub parts: UrlParts,
    pub socket: Option<TcpStream>,
    pub output: Option<OutputFile>,
    pub stage: Stage,
    pub buf: RecvBuffer,

    /// Body bytes written to the file during this run.
    pub bytes_received: u64,
    /// Value of the Content-Length header, if any.
    pub content_length: u64,
    /// Resolved full-entity size (Content-Length on fresh transfers,
    /// Content-Range entity length on resumes).
    pub total_length: u64,
    /// Bytes already on disk before this run; set once, before the
    /// request is sent.
    pub restart_offset: u64,
    pub status_code: u16,
    pub reason: String,

    started: Instant,
    /// `None` until the task finishes ("not yet measured").
    pub elapsed: Option<Duration>,

    /// Send the genuine client identity instead of the browser string.
    pub genuine_agent: bool,
    /// The local file existed and is being appended to.
    pub resumed: bool,
    /// Drop body bytes instead of writing them (416 handling).
    pub discard_body: bool,

    /// Terminal error, recorded when the task is pulled into Finished.
    pub error: Option<TaskError>,
}

impl Task {
    pub fn new(
        parts: UrlParts,
        output: OutputFile,
        restart_offset: u64,
        resumed: bool,
        buffer_capacity: usize,
        genuine_agent: bool,
    ) -> Self {
        Self {
            parts,
            socket: None,
            output: Some(output),
            stage: Stage::Init,
            buf: RecvBuffer::new(buffer_capacity),
            bytes_received: 0,
            content_length: 0,
            total_length: 0,
            restart_offset,
            status_code: 0,
            reason: String::new(),
            started: Instant::now(),
            elapsed: None,
            genuine_agent,
            resumed,
            discard_body: false,
            error: None,
        }
    }

    /// Restart the clock; called when headers end so elapsed measures
    /// body transfer time.
    pub fn reset_clock(&mut self) {
        self.started = Instant::now();
        self.elapsed = None;
    }

    /// Store the reason phrase, truncating to the fixed cap.
    pub fn set_reason(&mut self, phrase: &str) {
        let mut end = phrase.len().min(REASON_PHRASE_MAX);
        while !phrase.is_char_boundary(end) {
            end -= 1;
        }
        self.reason = phrase[..end].to_string();
    }

    /// Close both handles and stamp the elapsed time. Safe to call once;
    /// entering `Finish` twice is a logic error upstream.
    pub fn finish(&mut self) {
        debug_assert!(self.stage != Stage::Finish, "finish entered twice");
        self.stage = Stage::Finish;
        self.elapsed = Some(self.started.elapsed().max(MIN_ELAPSED));
        self.socket = None;
        self.output = None;
    }

    /// Record a terminal error and finish.
    pub fn fail(&mut self, err: TaskError) {
        tracing::warn!("{}: {}", self.parts.url, err);
        self.error = Some(err);
        self.finish();
    }
}
