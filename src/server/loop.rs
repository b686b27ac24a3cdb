// Server loop module
// Accepts connections until the shutdown future resolves

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Pause after a failed accept, e.g. when the process is out of descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop shared by the binary and the integration tests
///
/// Returns once `shutdown` resolves. Connections already accepted keep
/// running; `connection_shutdown` tells them to finish up.
pub async fn start_server_loop<F>(
    listener: &TcpListener,
    state: &Arc<AppState>,
    active_connections: &Arc<AtomicUsize>,
    connection_shutdown: &watch::Receiver<bool>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            state,
                            active_connections,
                            connection_shutdown,
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }

            () = &mut shutdown => break,
        }
    }
}
