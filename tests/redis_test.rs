//! Tests for the Redis backend against an in-process RESP server.
#![cfg(feature = "redis")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use munin::backend::{ConnectOptions, KeyValueBackend, RedisBackend};
use munin::providers::{HealthMonitor, ProviderRegistry};

// ============================================================================
// Minimal RESP server
// ============================================================================

/// Parse one `*N` array of bulk strings from the front of `buf`.
///
/// Returns the command words and the number of bytes consumed, or `None`
/// if the buffer does not yet hold a full command.
fn parse_command(buf: &[u8]) -> Option<(Vec<String>, usize)> {
    fn line(buf: &[u8], from: usize) -> Option<(&[u8], usize)> {
        let end = buf[from..].windows(2).position(|w| w == b"\r\n")? + from;
        Some((&buf[from..end], end + 2))
    }

    let (header, mut pos) = line(buf, 0)?;
    let count: usize = std::str::from_utf8(header.strip_prefix(b"*")?).ok()?.parse().ok()?;
    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        let (len_line, next) = line(buf, pos)?;
        let len: usize = std::str::from_utf8(len_line.strip_prefix(b"$")?).ok()?.parse().ok()?;
        if buf.len() < next + len + 2 {
            return None;
        }
        words.push(String::from_utf8_lossy(&buf[next..next + len]).into_owned());
        pos = next + len + 2;
    }
    Some((words, pos))
}

/// Answer PING with PONG and everything else with OK.
///
/// With `drop_after_ping`, the connection is closed right after the first
/// PING reply.
async fn serve(mut stream: TcpStream, drop_after_ping: bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        while let Some((words, used)) = parse_command(&buf) {
            buf.drain(..used);
            let is_ping = words
                .first()
                .is_some_and(|w| w.eq_ignore_ascii_case("PING"));
            let reply: &[u8] = if is_ping { b"+PONG\r\n" } else { b"+OK\r\n" };
            if stream.write_all(reply).await.is_err() {
                return;
            }
            if is_ping && drop_after_ping {
                return;
            }
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Start a server whose first connection dies after one PING; later
/// connections are served normally. Returns the URL and a connection count.
async fn flaky_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
            tokio::spawn(serve(stream, first));
        }
    });

    (format!("redis://{addr}/0"), accepted)
}

fn options() -> ConnectOptions {
    ConnectOptions::default()
        .connect_timeout(Duration::from_secs(1))
        .response_timeout(Duration::from_secs(1))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn backend_reconnects_after_connection_drop() {
    let (url, accepted) = flaky_server().await;
    let backend = RedisBackend::open(&url, options()).unwrap();

    backend.ping().await.unwrap();

    let err = backend.ping().await.unwrap_err();
    assert!(err.is_transient(), "dropped connection should be transient: {err}");

    backend.ping().await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn provider_stays_up_across_a_dropped_connection() {
    let (url, accepted) = flaky_server().await;
    let registry = ProviderRegistry::new();
    let provider = registry.register("flaky", Arc::new(RedisBackend::open(&url, options()).unwrap()));
    let monitor = HealthMonitor::default();

    // The server hangs up after the first PING, so INFO fails and the
    // report falls back to "connected".
    let first = monitor.probe_one(&provider).await;
    assert!(first.is_up());
    assert_eq!(first.server_info, "connected");

    let second = monitor.probe_one(&provider).await;
    assert!(second.is_up(), "{}", second.error);
    assert!(provider.is_healthy());
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(
        registry.fastest_healthy().map(|p| p.name().to_string()).as_deref(),
        Some("flaky")
    );
}

#[tokio::test]
async fn server_replies_keep_the_connection() {
    let (url, accepted) = flaky_server().await;
    let backend = RedisBackend::open(&url, options()).unwrap();

    // SETEX and DEL are answered with +OK on the first connection.
    backend.set("tc:Read:1", "v", Duration::from_secs(60)).await.unwrap();
    backend.delete("tc:Read:1").await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}
