// Server module entry point
// Listener setup, accept loop, connection handling and graceful shutdown

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module is named server_loop
#[path = "loop.rs"]
pub mod server_loop;

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::{AppState, Config};
use crate::logger;

// Re-export commonly used types
pub use connection::serve_connection;
pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;

/// How often shutdown checks for remaining connections
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bind the configured address and serve until SIGINT or SIGTERM
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.get_socket_addr()?;
    let listener = create_reusable_listener(addr)?;
    logger::log_server_start(&listener.local_addr()?, &config);

    let state = Arc::new(AppState::new(config));
    serve(listener, state, wait_for_signal()).await?;
    Ok(())
}

async fn wait_for_signal() {
    match signal::shutdown_signal().await {
        Ok(name) => logger::log_info(&format!("[Signal] {name} received")),
        Err(e) => {
            logger::log_error(&format!("Failed to register signal handlers: {e}"));
            std::future::pending::<()>().await;
        }
    }
}

/// Serve connections from `listener` until `shutdown` resolves
///
/// After shutdown no new connections are accepted. Open connections get up
/// to `performance.shutdown_timeout` seconds to finish; idle keep-alive
/// connections are closed right away.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    let active_connections = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    start_server_loop(
        &listener,
        &state,
        &active_connections,
        &shutdown_rx,
        shutdown,
    )
    .await;
    drop(listener);

    logger::log_shutdown_started(active_connections.load(Ordering::SeqCst));
    shutdown_tx.send_replace(true);

    let timeout = Duration::from_secs(state.config.performance.shutdown_timeout);
    let started = Instant::now();
    let remaining = drain(&active_connections, timeout).await;
    logger::log_shutdown_complete(remaining, started.elapsed());
    Ok(())
}

/// Wait until no connections remain or `timeout` passes
async fn drain(active_connections: &AtomicUsize, timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = active_connections.load(Ordering::SeqCst);
        if remaining == 0 || Instant::now() >= deadline {
            return remaining;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_returns_when_idle() {
        let active = AtomicUsize::new(0);
        assert_eq!(drain(&active, Duration::from_secs(5)).await, 0);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let active = AtomicUsize::new(2);
        let remaining = drain(&active, Duration::from_millis(120)).await;
        assert_eq!(remaining, 2);
    }
}
