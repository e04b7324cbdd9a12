//! shutdown-daemon: background daemon guarded by the graceful shutdown coordinator
//!
//! The daemon runs a Unix socket IPC server and installs the coordinator:
//! - SIGINT/SIGTERM or an IPC `shutdown` request start the shutdown sequence
//! - registered handlers run concurrently (pid file removal, output flush)
//! - the IPC server is closed last, then the process terminates
//! - the whole sequence is bounded by the configured grace period

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shutdown_daemon::ipc::Server;
use shutdown_daemon::{Config, ShutdownCoordinator, ShutdownHandler, Signal};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "shutdown-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        timeout_ms = config.shutdown.timeout_ms,
        use_exit0 = config.shutdown.use_exit0,
        "configuration loaded"
    );

    let server = Arc::new(Server::new(&config.socket_path)?);

    let coordinator = ShutdownCoordinator::builder(config.shutdown.clone())
        .protect(server.clone())
        .install()
        .context("failed to install shutdown coordinator")?;
    server.attach(coordinator.downgrade());

    // Pid file lives exactly as long as the daemon
    let pid_path = config.pid_path();
    std::fs::write(&pid_path, std::process::id().to_string())
        .context("failed to write pid file")?;
    coordinator.graceful_shutdown(ShutdownHandler::from_async(move |signal| {
        let pid_path = pid_path.clone();
        async move {
            tokio::fs::remove_file(&pid_path)
                .await
                .with_context(|| format!("failed to remove {}", pid_path.display()))?;
            info!(%signal, ?pid_path, "pid file removed");
            Ok::<(), anyhow::Error>(())
        }
    }));

    coordinator.graceful_shutdown(ShutdownHandler::from_callback(|signal, done| {
        info!(%signal, "flushing output");
        done.finish(std::io::stdout().flush().map_err(Into::into));
    }));

    // Log lifecycle events as they happen
    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(%event, "shutdown event"),
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "shutdown event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("daemon initialized, entering main loop");

    if let Err(e) = server.run().await {
        error!(?e, "IPC server error");
        coordinator.on_signal(Signal::Terminate).await;
    }

    // The coordinator terminates the process; returning here would race it.
    std::future::pending::<()>().await;
    Ok(())
}
