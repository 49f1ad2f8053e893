//! Unix domain socket server for IPC
//!
//! Carries front-end reports into the session queue and pushes engine
//! commands and session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::VoiceEvent;
use crate::lifecycle::ShutdownSignal;
use crate::permission::Capability;
use crate::state::Message;

use super::protocol::{Notification, Request, Response, SessionStatus};

const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Channels connecting the server to the rest of the daemon
#[derive(Clone)]
pub struct SessionLinks {
    /// Session message queue
    pub inbound: mpsc::Sender<Message>,
    /// Commands and events for subscribed clients
    pub notifications: broadcast::Sender<Notification>,
    /// Latest microphone authorization reported by a client
    pub permission_reports: Arc<watch::Sender<Option<Capability>>>,
    pub shutdown: ShutdownSignal,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    links: SessionLinks,
}

/// Shared server state
struct ServerState {
    status: SessionStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, links: SessionLinks) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: SessionStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            links,
        })
    }

    /// Fold a session event into the status served to clients
    pub async fn apply_event(&self, event: &VoiceEvent) {
        let mut server_state = self.state.write().await;
        let previous = server_state.status.recognition;
        server_state.status.apply(event);

        if previous != server_state.status.recognition {
            debug!(
                from = %previous,
                to = %server_state.status.recognition,
                "IPC server: recognition state updated"
            );
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let links = self.links.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, links) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        links: SessionLinks,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Frames are read on their own task so a partially read frame is
        // never dropped when a notification wins the select below.
        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(16);
        let reader_task = tokio::spawn(async move {
            loop {
                match Self::read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        if frame_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(?e, "failed to read frame");
                        break;
                    }
                }
            }
        });

        let mut subscription: Option<broadcast::Receiver<Notification>> = None;

        let result = loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else {
                        debug!("client disconnected");
                        break Ok(());
                    };

                    let response = match serde_json::from_slice::<Request>(&frame) {
                        Ok(request) => {
                            debug!(?request, "received request");
                            let (response, subscribe) =
                                Self::process_request(request, &state, &links).await;
                            if subscribe && subscription.is_none() {
                                subscription = Some(links.notifications.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                        Err(e) => {
                            warn!(?e, "failed to parse request");
                            Response::Error {
                                code: "bad_request".to_string(),
                                message: e.to_string(),
                            }
                        }
                    };

                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }

                notification = Self::next_notification(&mut subscription) => {
                    match notification {
                        Ok(notification) => {
                            if let Err(e) = Self::send_message(&mut writer, &notification).await {
                                break Err(e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "client notification stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break Ok(()),
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Read a length-prefixed frame, `None` on disconnect
    async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(None);
        }

        let mut msg_buf = vec![0u8; len];
        reader.read_exact(&mut msg_buf).await?;
        Ok(Some(msg_buf))
    }

    async fn next_notification(
        subscription: &mut Option<broadcast::Receiver<Notification>>,
    ) -> Result<Notification, broadcast::error::RecvError> {
        match subscription {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        links: &SessionLinks,
    ) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                (Response::Status(state.status.clone()), false)
            }

            Request::Subscribe => (Response::Subscribed, true),

            Request::PermissionState { capability } => {
                info!(%capability, "microphone authorization reported");
                links.permission_reports.send_replace(Some(capability));
                (Response::Accepted, false)
            }

            Request::Shutdown => {
                info!("shutdown requested via IPC");
                links.shutdown.trigger();
                (Response::Accepted, false)
            }

            request => match request.into_message() {
                Some(message) => match links.inbound.send(message).await {
                    Ok(()) => (Response::Accepted, false),
                    Err(_) => (
                        Response::Error {
                            code: "session_closed".to_string(),
                            message: "voice session is not running".to_string(),
                        },
                        false,
                    ),
                },
                None => (
                    Response::Error {
                        code: "unsupported".to_string(),
                        message: "request carries no session message".to_string(),
                    },
                    false,
                ),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        // Err only means no client handler is running
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
