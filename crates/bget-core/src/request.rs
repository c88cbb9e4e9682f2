//! Connection setup and HTTP/1.0 request construction.
//!
//! Hosts are numeric IPv4 addresses; no name resolution happens anywhere
//! in this client. The request is a plain HTTP/1.0 GET with a `Range`
//! header when the local file already holds a prefix of the entity.

use std::net::{SocketAddr, SocketAddrV4};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::TaskError;
use crate::task::{Stage, Task};

/// Default identity: a mainstream browser string, for servers that serve
/// different content to download tools.
pub const SPOOFED_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; WOW64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/35.0.1916.153 Safari/537.36";

/// Honest identity, selectable per run.
pub const GENUINE_AGENT: &str = "Wget/1.5.3";

const ACCEPT: &str = "*/*";

/// Cap on the rendered request. A path long enough to cross this is not
/// worth sending.
const MAX_REQUEST_LEN: usize = 8 * 1024;

/// Render the full request head for `task`, including the `Range` header
/// when resuming. Never produces a malformed `Range` value: the offset is
/// formatted through checked string building and the whole request is
/// length-capped before anyone tries to send it.
pub fn build_request(task: &Task) -> Result<String, TaskError> {
    let agent = if task.genuine_agent {
        GENUINE_AGENT
    } else {
        SPOOFED_AGENT
    };

    let range = if task.restart_offset > 0 {
        format!("Range: bytes={}-\r\n", task.restart_offset)
    } else {
        String::new()
    };

    let request = format!(
        "GET {path} HTTP/1.0\r\n\
         User-Agent: {agent}\r\n\
         Host: {host}:{port}\r\n\
         Accept: {accept}\r\n\
         {range}\r\n",
        path = task.parts.path,
        agent = agent,
        host = task.parts.host,
        port = task.parts.port,
        accept = ACCEPT,
        range = range,
    );

    if request.len() > MAX_REQUEST_LEN {
        return Err(TaskError::Invalid(format!(
            "request head is {} bytes, cap is {}",
            request.len(),
            MAX_REQUEST_LEN
        )));
    }
    Ok(request)
}

/// Connect if not yet connected, then send the request. On failure the
/// task keeps whatever progress it made — an established socket survives
/// a failed send — so the scheduler can re-queue it for a later pass.
pub async fn connect_and_send(task: &mut Task) -> Result<(), TaskError> {
    if task.stage < Stage::SendRequest {
        let addr = SocketAddr::V4(SocketAddrV4::new(task.parts.host, task.parts.port));
        let socket = TcpStream::connect(addr).await.map_err(TaskError::Connect)?;
        tracing::debug!("{}: connected to {}", task.parts.url, addr);
        task.socket = Some(socket);
        task.stage = Stage::SendRequest;
    }

    let request = build_request(task)?;
    let socket = task
        .socket
        .as_mut()
        .ok_or_else(|| TaskError::Internal("send attempted without a socket".into()))?;
    socket
        .write_all(request.as_bytes())
        .await
        .map_err(TaskError::Write)?;

    tracing::debug!("{}: request sent, awaiting response", task.parts.url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::test_util::test_task;

    #[test]
    fn fresh_request_has_no_range() {
        let dir = tempfile::tempdir().unwrap();
        let t = test_task(dir.path(), "a.bin");
        let req = build_request(&t).unwrap();
        assert!(req.starts_with("GET /a.bin HTTP/1.0\r\n"));
        assert!(req.contains("Host: 127.0.0.1:80\r\n"));
        assert!(req.contains("Accept: */*\r\n"));
        assert!(!req.contains("Range:"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn resumed_request_carries_range_from_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = test_task(dir.path(), "a.bin");
        t.restart_offset = 8_675_309;
        let req = build_request(&t).unwrap();
        assert!(req.contains("Range: bytes=8675309-\r\n"));
    }

    #[test]
    fn agent_flag_switches_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = test_task(dir.path(), "a.bin");
        assert!(build_request(&t).unwrap().contains(SPOOFED_AGENT));
        t.genuine_agent = true;
        let req = build_request(&t).unwrap();
        assert!(req.contains("User-Agent: Wget/1.5.3\r\n"));
    }

    #[test]
    fn absurd_path_is_rejected_before_send() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = test_task(dir.path(), "a.bin");
        t.parts.path = format!("/{}", "x".repeat(MAX_REQUEST_LEN));
        assert!(matches!(build_request(&t), Err(TaskError::Invalid(_))));
    }
}
