//! Stage-scoped HTTP/1.0 response parsing.
//!
//! Each function consumes what it can from the task's receive buffer and
//! reports whether the caller should wait for more socket data
//! (`NeedMore`) or re-dispatch immediately because a stage boundary was
//! crossed with bytes left over (`Continue`). Structural failures in the
//! status line are terminal for the task; individual bad header lines are
//! logged and skipped.

use crate::buffer::find_crlf;
use crate::error::TaskError;
use crate::task::{Stage, Task};

/// Outcome of one parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseProgress {
    /// The current stage cannot advance without another socket read.
    NeedMore,
    /// A stage completed and unconsumed bytes remain; dispatch again
    /// without reading.
    Continue,
}

/// Parsed `Content-Range: bytes A-B/T` value. Produced by header parsing
/// and consumed immediately for offset reconciliation; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first_byte_pos: u64,
    pub last_byte_pos: u64,
    pub entity_length: u64,
}

/// One classified header line. A closed set: recognized names parse into
/// typed values, everything else is `Unknown`, and a recognized name with
/// an unparseable value is `Malformed` (skipped, never fatal).
#[derive(Debug)]
enum HeaderField {
    ContentLength(u64),
    ContentRange(ContentRange),
    ContentType(String),
    AcceptRanges(String),
    LastModified(String),
    Unknown(String),
    Malformed(&'static str),
}

/// Parse result for one buffered line.
enum LineStep {
    Incomplete,
    Blank,
    Field(HeaderField, usize),
}

fn skip_lws(s: &[u8]) -> &[u8] {
    let n = s.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
    &s[n..]
}

/// Leading decimal run: (value, digits consumed). `None` on overflow.
fn digit_run(s: &[u8]) -> Option<(u64, usize)> {
    let n = s.iter().take_while(|b| b.is_ascii_digit()).count();
    let mut val: u64 = 0;
    for &b in &s[..n] {
        val = val
            .checked_mul(10)?
            .checked_add(u64::from(b - b'0'))?;
    }
    Some((val, n))
}

/// Parse the status line. Requires a complete CRLF-terminated line; the
/// grammar is `HTTP/<major>.<minor> <3-digit code> <reason>`.
pub fn parse_status_line(task: &mut Task) -> Result<ParseProgress, TaskError> {
    if task.stage != Stage::ParseStatusLine {
        return Err(TaskError::Internal(format!(
            "status-line parse in stage {:?}",
            task.stage
        )));
    }

    let (code, reason, consumed) = {
        let data = task.buf.data();
        let Some(eol) = find_crlf(data) else {
            if task.buf.len() == task.buf.capacity() {
                return Err(TaskError::InvalidResponse(
                    "status line exceeds buffer capacity".into(),
                ));
            }
            return Ok(ParseProgress::NeedMore);
        };
        let line = &data[..eol];

        let bad = |_| TaskError::InvalidResponse(format!(
            "invalid status line: {}",
            String::from_utf8_lossy(line)
        ));

        let rest = line
            .strip_prefix(b"HTTP/")
            .ok_or(())
            .map_err(bad)?;

        let (major, n) = digit_run(rest).ok_or(()).map_err(bad)?;
        if n == 0 || rest.get(n) != Some(&b'.') {
            return Err(bad(()));
        }
        let rest = &rest[n + 1..];

        let (minor, n) = digit_run(rest).ok_or(()).map_err(bad)?;
        if n == 0 || rest.get(n) != Some(&b' ') {
            return Err(bad(()));
        }
        let rest = &rest[n + 1..];

        if rest.len() < 3 || !rest[..3].iter().all(u8::is_ascii_digit) {
            return Err(bad(()));
        }
        let code = rest[..3]
            .iter()
            .fold(0u16, |acc, &b| acc * 10 + u16::from(b - b'0'));

        // Exactly one space, then the reason phrase to end of line.
        if rest.get(3) != Some(&b' ') {
            return Err(bad(()));
        }
        let reason = String::from_utf8_lossy(&rest[4..]).into_owned();

        tracing::debug!("{}: HTTP/{}.{} {}", task.parts.url, major, minor, code);
        (code, reason, eol + 2)
    };

    task.status_code = code;
    task.set_reason(&reason);
    task.stage = Stage::ParseHeader;
    task.buf.consume(consumed);

    if task.buf.is_empty() {
        Ok(ParseProgress::NeedMore)
    } else {
        Ok(ParseProgress::Continue)
    }
}

/// Consume header lines until the blank line or an incomplete tail.
pub fn parse_headers(task: &mut Task) -> Result<ParseProgress, TaskError> {
    if task.stage != Stage::ParseHeader {
        return Err(TaskError::Internal(format!(
            "header parse in stage {:?}",
            task.stage
        )));
    }

    loop {
        let step = {
            let data = task.buf.data();
            match find_crlf(data) {
                None => LineStep::Incomplete,
                Some(0) => LineStep::Blank,
                Some(eol) => LineStep::Field(classify_header_line(&data[..eol]), eol + 2),
            }
        };

        match step {
            LineStep::Incomplete => {
                if task.buf.len() == task.buf.capacity() {
                    return Err(TaskError::InvalidResponse(
                        "header block exceeds buffer capacity".into(),
                    ));
                }
                return Ok(ParseProgress::NeedMore);
            }
            LineStep::Blank => {
                task.buf.consume(2);
                task.reset_clock();
                task.stage = Stage::RecvContent;
                if task.status_code == 416 {
                    // Requested range not satisfiable: the local file
                    // already holds the full entity. Keep it untouched.
                    tracing::info!(
                        "{}: range not satisfiable, local file complete",
                        task.parts.local
                    );
                    task.discard_body = true;
                }
                return Ok(ParseProgress::Continue);
            }
            LineStep::Field(field, consumed) => {
                apply_header(task, field);
                task.buf.consume(consumed);
            }
        }
    }
}

fn apply_header(task: &mut Task, field: HeaderField) {
    match field {
        HeaderField::ContentLength(v) => {
            task.content_length = v;
            if task.restart_offset == 0 && task.total_length == 0 {
                // Fresh transfer: the entity is exactly the body.
                task.total_length = v;
            }
        }
        HeaderField::ContentRange(r) => {
            if r.first_byte_pos != task.restart_offset {
                // Server granted a different start than we asked for.
                // Keep the client-side offset as authoritative.
                tracing::warn!(
                    "{}: restart offset {} but server range {}-{}/{}",
                    task.parts.local,
                    task.restart_offset,
                    r.first_byte_pos,
                    r.last_byte_pos,
                    r.entity_length
                );
            } else {
                task.total_length = r.entity_length;
            }
        }
        HeaderField::ContentType(v) => tracing::debug!("Content-Type: {}", v),
        HeaderField::AcceptRanges(v) => tracing::debug!("Accept-Ranges: {}", v),
        HeaderField::LastModified(v) => tracing::debug!("Last-Modified: {}", v),
        HeaderField::Unknown(line) => tracing::debug!("unsupported header: {}", line),
        HeaderField::Malformed(name) => {
            tracing::warn!("{}: skipping malformed {} header", task.parts.local, name)
        }
    }
}

fn classify_header_line(line: &[u8]) -> HeaderField {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return HeaderField::Unknown(String::from_utf8_lossy(line).into_owned());
    };
    let name = &line[..colon];
    let value = skip_lws(&line[colon + 1..]);

    if name.eq_ignore_ascii_case(b"content-length") {
        return match digit_run(value) {
            Some((v, n)) if n > 0 && n == value.len() => HeaderField::ContentLength(v),
            _ => HeaderField::Malformed("Content-Length"),
        };
    }
    if name.eq_ignore_ascii_case(b"content-range") {
        return match parse_content_range(value) {
            Some(r) => HeaderField::ContentRange(r),
            None => HeaderField::Malformed("Content-Range"),
        };
    }
    if name.eq_ignore_ascii_case(b"content-type") {
        return HeaderField::ContentType(String::from_utf8_lossy(value).into_owned());
    }
    if name.eq_ignore_ascii_case(b"accept-ranges") {
        return HeaderField::AcceptRanges(String::from_utf8_lossy(value).into_owned());
    }
    if name.eq_ignore_ascii_case(b"last-modified") {
        return HeaderField::LastModified(String::from_utf8_lossy(value).into_owned());
    }
    HeaderField::Unknown(String::from_utf8_lossy(line).into_owned())
}

/// Parse a `Content-Range` value: `bytes A-B/T`. Some proxies omit the
/// `bytes` token; tolerate it present or absent. Trailing garbage after
/// the entity length is ignored.
fn parse_content_range(value: &[u8]) -> Option<ContentRange> {
    let mut v = value;
    if v.len() >= 5 && v[..5].eq_ignore_ascii_case(b"bytes") {
        v = skip_lws(&v[5..]);
        if v.is_empty() {
            return None;
        }
    }

    let (first_byte_pos, n) = digit_run(v)?;
    if n == 0 || v.get(n) != Some(&b'-') {
        return None;
    }
    v = &v[n + 1..];

    let (last_byte_pos, n) = digit_run(v)?;
    if n == 0 || v.get(n) != Some(&b'/') {
        return None;
    }
    v = &v[n + 1..];

    let (entity_length, n) = digit_run(v)?;
    if n == 0 {
        return None;
    }

    Some(ContentRange {
        first_byte_pos,
        last_byte_pos,
        entity_length,
    })
}

/// Flush whatever body bytes are buffered to the output file. Write
/// failures are logged and best-effort synced; the unwritten bytes stay
/// buffered for the next attempt.
pub fn recv_content(task: &mut Task) -> Result<(), TaskError> {
    if task.stage != Stage::RecvContent {
        return Err(TaskError::Internal(format!(
            "content flush in stage {:?}",
            task.stage
        )));
    }
    if task.buf.is_empty() {
        task.buf.clear();
        return Ok(());
    }

    if task.discard_body {
        let n = task.buf.len();
        tracing::debug!("{}: discarding {} body bytes", task.parts.local, n);
        task.buf.clear();
        return Ok(());
    }

    let Task {
        ref mut buf,
        ref mut output,
        ..
    } = *task;
    let Some(out) = output.as_mut() else {
        return Err(TaskError::Internal("content flush without output file".into()));
    };

    let len = buf.data().len() as u64;
    match out.append(buf.data()) {
        Ok(()) => {
            buf.clear();
            task.bytes_received += len;
            if task.total_length > 0
                && task.restart_offset + task.bytes_received > task.total_length
            {
                tracing::warn!(
                    "{}: received {} past advertised total {}",
                    task.parts.local,
                    task.restart_offset + task.bytes_received,
                    task.total_length
                );
            }
        }
        Err(e) => {
            tracing::warn!("{}: flush failed: {}", out.path().display(), e);
            if let Err(se) = out.sync() {
                tracing::warn!("{}: sync after failed flush: {}", out.path().display(), se);
            }
        }
    }
    Ok(())
}
