//! Scheduler tests against scripted loopback servers.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::BatchError;
use crate::queue::Batch;
use crate::storage::OutputFile;
use crate::task::Task;
use crate::url_model::UrlParts;

use super::{run_batch, RunOptions};

/// One step of a server script: pause, then send the bytes.
struct Step(Duration, Vec<u8>);

fn now(bytes: &[u8]) -> Step {
    Step(Duration::ZERO, bytes.to_vec())
}

fn after(ms: u64, bytes: &[u8]) -> Step {
    Step(Duration::from_millis(ms), bytes.to_vec())
}

/// Scripted HTTP server for one connection: reads the request head, plays
/// the steps, then either closes or holds the socket open until the peer
/// goes away. The join handle yields the captured request head.
fn spawn_server(steps: Vec<Step>, hold_open: bool) -> (u16, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match conn.read(&mut byte) {
                Ok(0) | Err(_) => break,
                Ok(_) => head.extend_from_slice(&byte),
            }
        }

        for Step(pause, bytes) in steps {
            if !pause.is_zero() {
                thread::sleep(pause);
            }
            if conn.write_all(&bytes).is_err() {
                break;
            }
            let _ = conn.flush();
        }

        if hold_open {
            // Keep the connection silent until the client closes it.
            let mut sink = [0u8; 64];
            while matches!(conn.read(&mut sink), Ok(n) if n > 0) {}
        }

        String::from_utf8_lossy(&head).into_owned()
    });
    (port, handle)
}

fn make_task(dir: &Path, port: u16, name: &str) -> Task {
    make_task_with_capacity(dir, port, name, 1024)
}

fn make_task_with_capacity(dir: &Path, port: u16, name: &str, capacity: usize) -> Task {
    let parts = UrlParts {
        url: format!("http://127.0.0.1:{port}/{name}"),
        host: std::net::Ipv4Addr::LOCALHOST,
        port,
        path: format!("/{name}"),
        local: name.to_string(),
    };
    let opened = OutputFile::open(&dir.join(name)).unwrap();
    Task::new(
        parts,
        opened.output,
        opened.restart_offset,
        opened.resumed,
        capacity,
        false,
    )
}

fn fast_opts() -> RunOptions {
    RunOptions {
        read_timeout: Duration::from_secs(5),
        timeout_retries: 3,
    }
}

#[tokio::test]
async fn split_status_line_yields_exact_body() {
    let dir = tempfile::tempdir().unwrap();
    // Three status-line bytes arrive first, the rest in one later chunk.
    let (port, server) = spawn_server(
        vec![
            now(b"HTT"),
            after(50, b"P/1.0 200 OK\r\nContent-Length: 5\r\n\r\nHELLO"),
        ],
        false,
    );

    let mut batch = Batch::new();
    batch.add(make_task(dir.path(), port, "hello.bin"));
    run_batch(&mut batch, &fast_opts()).await.unwrap();

    assert_eq!(batch.finished.len(), 1);
    let task = batch.finished.iter().next().unwrap();
    assert!(task.error.is_none());
    assert_eq!(task.status_code, 200);
    assert_eq!(task.reason, "OK");
    assert_eq!(task.bytes_received, 5);
    assert_eq!(task.content_length, 5);
    assert_eq!(
        std::fs::read(dir.path().join("hello.bin")).unwrap(),
        b"HELLO"
    );
    server.join().unwrap();
}

#[tokio::test]
async fn zero_length_body_does_not_disturb_other_task() {
    let dir = tempfile::tempdir().unwrap();
    let (port_a, server_a) = spawn_server(
        vec![now(b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n")],
        false,
    );
    let (port_b, server_b) = spawn_server(
        vec![
            now(b"HTTP/1.0 200 OK\r\nContent-Length: 10\r\n\r\n"),
            after(80, b"0123456789"),
        ],
        false,
    );

    let mut batch = Batch::new();
    batch.add(make_task(dir.path(), port_a, "empty.bin"));
    batch.add(make_task(dir.path(), port_b, "full.bin"));
    run_batch(&mut batch, &fast_opts()).await.unwrap();

    assert_eq!(batch.finished.len(), 2);
    for task in batch.finished.iter() {
        assert!(task.error.is_none(), "{}: {:?}", task.parts.local, task.error);
        match task.parts.local.as_str() {
            "empty.bin" => assert_eq!(task.bytes_received, 0),
            "full.bin" => assert_eq!(task.bytes_received, 10),
            other => panic!("unexpected task {other}"),
        }
    }
    assert_eq!(std::fs::read(dir.path().join("full.bin")).unwrap(), b"0123456789");
    server_a.join().unwrap();
    server_b.join().unwrap();
}

#[tokio::test]
async fn resume_sends_range_and_appends() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("resume.bin"), b"hello").unwrap();

    let (port, server) = spawn_server(
        vec![now(
            b"HTTP/1.0 206 Partial Content\r\n\
              Content-Length: 6\r\n\
              Content-Range: bytes 5-10/11\r\n\r\n world",
        )],
        false,
    );

    let mut batch = Batch::new();
    batch.add(make_task(dir.path(), port, "resume.bin"));
    run_batch(&mut batch, &fast_opts()).await.unwrap();

    let request = server.join().unwrap();
    assert!(
        request.contains("Range: bytes=5-\r\n"),
        "request was: {request}"
    );

    let task = batch.finished.iter().next().unwrap();
    assert!(task.error.is_none());
    assert_eq!(task.status_code, 206);
    assert_eq!(task.restart_offset, 5);
    assert_eq!(task.total_length, 11);
    assert_eq!(task.bytes_received, 6);
    assert_eq!(
        std::fs::read(dir.path().join("resume.bin")).unwrap(),
        b"hello world"
    );
}

#[tokio::test]
async fn rerun_of_complete_file_is_idempotent_on_416() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("done.bin"), b"HELLO").unwrap();

    let (port, server) = spawn_server(
        vec![now(b"HTTP/1.0 416 Requested Range Not Satisfiable\r\n\r\n")],
        false,
    );

    let mut batch = Batch::new();
    batch.add(make_task(dir.path(), port, "done.bin"));
    run_batch(&mut batch, &fast_opts()).await.unwrap();

    let request = server.join().unwrap();
    assert!(request.contains("Range: bytes=5-\r\n"));

    let task = batch.finished.iter().next().unwrap();
    assert!(task.error.is_none());
    assert_eq!(task.status_code, 416);
    assert_eq!(task.bytes_received, 0);
    assert_eq!(std::fs::read(dir.path().join("done.bin")).unwrap(), b"HELLO");
}

#[tokio::test]
async fn sustained_timeout_aborts_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    // Server answers the accept but never sends a byte.
    let (port, server) = spawn_server(vec![], true);

    let mut batch = Batch::new();
    batch.add(make_task(dir.path(), port, "stalled.bin"));

    let opts = RunOptions {
        read_timeout: Duration::from_millis(50),
        timeout_retries: 3,
    };
    let err = run_batch(&mut batch, &opts).await.unwrap_err();
    assert!(matches!(
        err,
        BatchError::TimeoutBudget { consecutive: 4 }
    ));
    // The stalled task was never reached: still in Downloading.
    assert_eq!(batch.downloading.len(), 1);
    assert_eq!(batch.finished.len(), 0);

    drop(batch); // closes the socket so the server thread can exit
    server.join().unwrap();
}

#[tokio::test]
async fn unreachable_host_stays_queued_in_initial() {
    let dir = tempfile::tempdir().unwrap();
    // Grab a port and close the listener so connects are refused.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };

    let mut batch = Batch::new();
    batch.add(make_task(dir.path(), port, "nowhere.bin"));
    run_batch(&mut batch, &fast_opts()).await.unwrap();

    assert_eq!(batch.initial.len(), 1);
    assert_eq!(batch.finished.len(), 0);
    assert_eq!(batch.total(), 1);
}

#[tokio::test]
async fn malformed_status_line_fails_only_that_task() {
    let dir = tempfile::tempdir().unwrap();
    let (port_bad, server_bad) = spawn_server(vec![now(b"ICY 200 OK\r\n\r\n")], false);
    let (port_good, server_good) = spawn_server(
        vec![
            now(b"HTTP/1.0 200 OK\r\nContent-Length: 3\r\n\r\n"),
            after(60, b"abc"),
        ],
        false,
    );

    let mut batch = Batch::new();
    batch.add(make_task(dir.path(), port_bad, "bad.bin"));
    batch.add(make_task(dir.path(), port_good, "good.bin"));
    run_batch(&mut batch, &fast_opts()).await.unwrap();

    assert_eq!(batch.finished.len(), 2);
    for task in batch.finished.iter() {
        match task.parts.local.as_str() {
            "bad.bin" => assert!(task.error.is_some()),
            "good.bin" => {
                assert!(task.error.is_none());
                assert_eq!(task.bytes_received, 3);
            }
            other => panic!("unexpected task {other}"),
        }
    }
    server_bad.join().unwrap();
    server_good.join().unwrap();
}

#[tokio::test]
async fn small_window_dribbled_body_arrives_intact() {
    let dir = tempfile::tempdir().unwrap();

    // Body larger than the receive window, delivered in awkward slices,
    // so header parsing and body flushing both cross compactions.
    let body: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let mut steps = vec![now(
        b"HTTP/1.0 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 1000\r\n\r\n",
    )];
    for chunk in body.chunks(37) {
        steps.push(after(1, chunk));
    }

    let (port, server) = spawn_server(steps, false);
    let mut batch = Batch::new();
    batch.add(make_task_with_capacity(dir.path(), port, "dribble.bin", 64));
    run_batch(&mut batch, &fast_opts()).await.unwrap();

    let task = batch.finished.iter().next().unwrap();
    assert!(task.error.is_none());
    assert_eq!(task.bytes_received, 1000);
    assert_eq!(std::fs::read(dir.path().join("dribble.bin")).unwrap(), body);
    server.join().unwrap();
}
