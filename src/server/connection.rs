// Connection handling module
// Accepts a TCP connection and serves its requests one after another

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::body::{self, Framing};
use crate::config::AppState;
use crate::error::HeadError;
use crate::handler;
use crate::http::{response, wire};
use crate::logger::{self, AccessLogEntry};

/// Decrements the active connection counter when the task ends
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accept a connection, enforce the connection limit and spawn its task.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
    shutdown: &watch::Receiver<bool>,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);
    let guard = ConnectionGuard(Arc::clone(conn_counter));

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= max_conn {
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    if let Err(e) = stream.set_nodelay(true) {
        logger::log_debug(&format!("Failed to set TCP_NODELAY for {peer_addr}: {e}"));
    }

    let state = Arc::clone(state);
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = serve_connection(stream, peer_addr, state, shutdown).await {
            logger::log_connection_error(&peer_addr, &e);
        }
    });
}

/// Serve requests on `stream` until the peer closes, a request asks to
/// close, a timeout fires or shutdown is signalled.
///
/// Every request body goes through the body reassembler before routing.
/// Body failures are answered and then the connection is closed, because
/// the position of the next request is unknown.
pub async fn serve_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let perf = &state.config.performance;
    let http_config = &state.config.http;
    let mut idle_timeout = perf.read_timeout;

    loop {
        let read_head = wire::read_request_head(&mut reader, http_config.max_header_size);
        let head = tokio::select! {
            head = with_timeout(idle_timeout, read_head) => head,
            _ = shutdown.changed() => break,
        };
        idle_timeout = perf.keep_alive_timeout;

        let head = match head {
            None => {
                logger::log_debug(&format!("[Connection] {peer_addr}: idle timeout"));
                break;
            }
            Some(Ok(None)) => break,
            Some(Ok(Some(head))) => head,
            Some(Err(HeadError::Io(e))) => return Err(e),
            Some(Err(e)) => {
                logger::log_connection_error(&peer_addr, &e);
                let mut resp = response::build_error_response(e.status());
                send(&mut writer, &mut resp, &state, false, true).await?;
                break;
            }
        };

        let started = Instant::now();
        let mut entry = state
            .config
            .logging
            .access_log
            .then(|| AccessLogEntry::for_request(peer_addr, &head));
        let is_head = head.method() == Method::HEAD;
        let mut keep_alive = wire::wants_keep_alive(&head) && !wire::has_ambiguous_framing(&head);

        if wire::expects_continue(&head) && body_acceptable(&head, http_config.max_body_size) {
            with_timeout(perf.write_timeout, wire::write_continue(&mut writer))
                .await
                .unwrap_or_else(|| Err(io::ErrorKind::TimedOut.into()))?;
        }

        let (parts, ()) = head.into_parts();
        let request = Request::from_parts(parts, Some(&mut reader));
        let reassembled = with_timeout(
            perf.read_timeout,
            body::reassemble(request, http_config.max_body_size),
        )
        .await;

        let mut resp = match reassembled {
            Some(Ok(req)) => handler::handle_request(req, &state).await,
            Some(Err(e)) => {
                logger::log_warning(&format!("[Body] {peer_addr}: {e}"));
                keep_alive = false;
                response::build_error_response(e.status())
            }
            None => {
                logger::log_warning(&format!("[Body] {peer_addr}: timed out reading body"));
                keep_alive = false;
                response::build_error_response(StatusCode::REQUEST_TIMEOUT)
            }
        };

        if *shutdown.borrow() {
            keep_alive = false;
        }

        let sent = send(&mut writer, &mut resp, &state, keep_alive, !is_head).await;
        if let Some(entry) = entry.as_mut() {
            entry.status = resp.status().as_u16();
            entry.body_bytes = if is_head { 0 } else { resp.body().len() };
            entry.request_time_us =
                u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            logger::log_access(entry, &state.config.logging.access_log_format);
        }
        sent?;

        if !keep_alive {
            break;
        }
    }

    // The peer may already be gone
    let _ = writer.shutdown().await;
    Ok(())
}

/// Whether a body announced with `Expect: 100-continue` would be read
fn body_acceptable(head: &Request<()>, max_body_size: u64) -> bool {
    match Framing::detect(head.headers()) {
        Ok(Framing::Length(length)) => length <= max_body_size,
        Ok(_) => true,
        Err(_) => false,
    }
}

/// Finalize and write one response under the write timeout
async fn send<W>(
    writer: &mut W,
    resp: &mut Response<Bytes>,
    state: &AppState,
    keep_alive: bool,
    include_body: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    wire::finalize_headers(resp, &state.config.http.server_name, keep_alive);
    with_timeout(
        state.config.performance.write_timeout,
        wire::write_response(writer, resp, include_body),
    )
    .await
    .unwrap_or_else(|| Err(io::ErrorKind::TimedOut.into()))
}

/// Run `fut` with a timeout in seconds, 0 disables the timeout.
/// Returns `None` when the timeout fired.
async fn with_timeout<F: Future>(secs: u64, fut: F) -> Option<F::Output> {
    if secs == 0 {
        Some(fut.await)
    } else {
        tokio::time::timeout(Duration::from_secs(secs), fut).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::state_in;
    use tokio::io::{AsyncReadExt, DuplexStream};

    struct Client {
        stream: DuplexStream,
        _shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<io::Result<()>>,
    }

    fn connect(state: AppState) -> Client {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (tx, rx) = watch::channel(false);
        let peer = "127.0.0.1:40000".parse().unwrap();
        let task = tokio::spawn(serve_connection(server, peer, Arc::new(state), rx));
        Client {
            stream: client,
            _shutdown: tx,
            task,
        }
    }

    async fn exchange(client: &mut Client, request: &[u8]) -> String {
        client.stream.write_all(request).await.unwrap();
        client.stream.shutdown().await.unwrap();
        let mut out = String::new();
        client.stream.read_to_string(&mut out).await.unwrap();
        out
    }

    fn quiet_state(root: &std::path::Path) -> AppState {
        let mut state = state_in(root);
        state.config.logging.access_log = false;
        state
    }

    #[tokio::test]
    async fn test_keep_alive_serves_pipelined_requests() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(
            &mut client,
            b"GET / HTTP/1.1\r\nHost: a\r\n\r\nGET /missing HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("<h1>collector</h1>"));
        assert!(out.contains("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.ends_with("<h1>not here</h1>"));
        client.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(&mut client, b"HEAD / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("content-length: 18\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_malformed_chunk_closes_connection() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(
            &mut client,
            b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nZZ\r\nWiki\r\n0\r\n\r\nGET / HTTP/1.1\r\n\r\n",
        )
        .await;

        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.contains("connection: close\r\n"));
        assert_eq!(out.matches("HTTP/1.1").count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_transfer_coding_closes_connection() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(
            &mut client,
            b"POST /upload HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\nGET /hidden HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.contains("connection: close\r\n"));
        assert_eq!(out.matches("HTTP/1.1").count(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_content_lengths_close_connection() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(
            &mut client,
            b"POST /upload HTTP/1.1\r\nContent-Length: 2\r\nContent-Length: 40\r\n\r\nabGET /hidden HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.contains("connection: close\r\n"));
        assert_eq!(out.matches("HTTP/1.1").count(), 1);
        assert!(!out.contains("404 Not Found"));
    }

    #[tokio::test]
    async fn test_signed_content_length_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(
            &mut client,
            b"POST /other HTTP/1.1\r\nContent-Length: +2\r\n\r\nab",
        )
        .await;

        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(!out.contains("405 Method Not Allowed"));
    }

    #[tokio::test]
    async fn test_truncated_chunk_is_client_error() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(
            &mut client,
            b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n10\r\nWiki",
        )
        .await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_bad_request_line() {
        let root = tempfile::tempdir().unwrap();
        let mut client = connect(quiet_state(root.path()));

        let out = exchange(&mut client, b"NOT A REQUEST\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected_without_continue() {
        let root = tempfile::tempdir().unwrap();
        let mut state = quiet_state(root.path());
        state.config.http.max_body_size = 8;
        let mut client = connect(state);

        let out = exchange(
            &mut client,
            b"POST /upload HTTP/1.1\r\nContent-Length: 100\r\nExpect: 100-continue\r\n\r\n",
        )
        .await;
        assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(!out.contains("100 Continue"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_connection() {
        let root = tempfile::tempdir().unwrap();
        let (mut client, server) = tokio::io::duplex(1024);
        let (tx, rx) = watch::channel(false);
        let peer = "127.0.0.1:40000".parse().unwrap();
        let task = tokio::spawn(serve_connection(
            server,
            peer,
            Arc::new(quiet_state(root.path())),
            rx,
        ));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_body_acceptable() {
        let head = Request::builder()
            .header("content-length", "10")
            .body(())
            .unwrap();
        assert!(body_acceptable(&head, 10));
        assert!(!body_acceptable(&head, 9));
    }
}
