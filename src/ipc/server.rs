//! Unix domain socket server for IPC
//!
//! Serves status queries and programmatic shutdown requests. This is the
//! server the shutdown coordinator protects: closing it stops accepting,
//! lets requests already being handled finish, then removes the socket.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::coordinator::{Phase, WeakCoordinator};
use crate::lifecycle::ProtectedServer;

use super::protocol::{DaemonStatus, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
    clients: TaskTracker,
    closed: AtomicBool,
}

/// Shared server state
struct ServerState {
    start_time: Instant,
    /// Set once the coordinator protecting this server is installed
    coordinator: OnceLock<WeakCoordinator>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path)
            .context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            state: Arc::new(ServerState {
                start_time: Instant::now(),
                coordinator: OnceLock::new(),
            }),
            cancel: CancellationToken::new(),
            clients: TaskTracker::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Connect the coordinator that status and shutdown requests go to
    pub fn attach(&self, coordinator: WeakCoordinator) {
        if self.state.coordinator.set(coordinator).is_err() {
            warn!("IPC server already attached to a coordinator");
        }
    }

    /// Run the server, accepting connections until it is closed
    pub async fn run(&self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("IPC server stopped accepting");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        debug!("client connected");
                        let state = Arc::clone(&self.state);
                        let cancel = self.cancel.clone();

                        self.clients.spawn(async move {
                            if let Err(e) = Self::handle_client(stream, state, cancel).await {
                                warn!(?e, "client handler error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(?e, "accept error");
                    }
                }
            }
        }
    }

    /// Handle a single client connection.
    ///
    /// A close request only interrupts the wait for the next request; one
    /// that is already being processed gets its response.
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<ServerState>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("closing idle client connection");
                    return Ok(());
                }
                read = stream.read_exact(&mut len_buf) => match read {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        debug!("client disconnected");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => {
                    debug!(?request, "received request");
                    Self::process_request(request, &state)
                }
                Err(e) => Response::Error {
                    code: "bad_request".to_string(),
                    message: e.to_string(),
                },
            };

            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    fn process_request(request: Request, state: &ServerState) -> Response {
        let coordinator = state.coordinator.get().and_then(WeakCoordinator::upgrade);

        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut status = DaemonStatus {
                    uptime_secs: state.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                };
                if let Some(coordinator) = coordinator {
                    status.phase = coordinator.phase();
                    status.handlers = coordinator.handler_count();
                    status.timeout_ms = coordinator.options().timeout_ms;
                }
                Response::Status(status)
            }

            Request::Shutdown { signal } => {
                let Some(coordinator) = coordinator else {
                    return Response::Error {
                        code: "unavailable".to_string(),
                        message: "no shutdown coordinator attached".to_string(),
                    };
                };

                let already = coordinator.phase() != Phase::Idle;
                if !already {
                    info!(%signal, "shutdown requested via IPC");
                    // Closing waits for this connection, so the sequence
                    // cannot run on the connection's own task.
                    tokio::spawn(async move {
                        coordinator.on_signal(signal).await;
                    });
                }
                Response::ShuttingDown { signal, already }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("IPC server already closed");
            return Ok(());
        }

        self.cancel.cancel();
        self.clients.close();
        self.clients.wait().await;

        // Remove socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("failed to remove socket file")?;
        }

        info!("IPC server shutdown complete");
        Ok(())
    }
}

#[async_trait]
impl ProtectedServer for Server {
    async fn close(&self) -> Result<()> {
        self.shutdown().await
    }
}
