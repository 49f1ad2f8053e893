//! voice-session-daemon: hands-free voice interaction coordinator
//!
//! Drives a speech recognition engine hosted by a front-end client:
//! - Microphone permission gating
//! - Recognition start/restart with bounded retry and backoff
//! - Silence-based utterance finalization and submission
//! - Mutual exclusion between listening and response playback
//!
//! The front-end attaches over a Unix socket, reports engine callbacks and
//! playback signals, and receives engine commands and session events.

mod config;
mod events;
mod ipc;
mod lifecycle;
mod permission;
mod phrases;
mod playback;
mod recognition;
mod silence;
mod state;
mod status;
mod submit;
mod timer;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::VoiceEvent;
use crate::ipc::{command_channel, front_end_collaborators, Notification, Server, SessionLinks};
use crate::lifecycle::ShutdownSignal;
use crate::recognition::EngineSettings;
use crate::state::{Message, VoiceSession};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voice-session-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, language = %config.voice.language, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Front-end reports, timers and permission checks -> session
    let (message_tx, message_rx) = mpsc::channel::<Message>(64);
    // Session -> event forwarder
    let (event_tx, _event_rx) = broadcast::channel::<VoiceEvent>(64);
    // Daemon -> subscribed front-ends
    let notify_tx = command_channel(64);

    let (collaborators, permission_reports) =
        front_end_collaborators(EngineSettings::from_config(&config.voice), &notify_tx);

    // Subscribe before the session emits its startup events
    let mut forward_rx = event_tx.subscribe();
    let mut attach_rx = permission_reports.subscribe();

    let mut session = VoiceSession::new(&config.voice, collaborators, message_tx.clone(), event_tx);

    let server = Server::new(
        &config.socket_path,
        SessionLinks {
            inbound: message_tx,
            notifications: notify_tx.clone(),
            permission_reports,
            shutdown: shutdown.clone(),
        },
    )?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Startup waits for the front-end's first authorization report
        _ = async {
            while attach_rx.borrow_and_update().is_none() {
                if attach_rx.changed().await.is_err() {
                    return;
                }
            }
            info!("front-end attached");
            session.run(message_rx).await
        } => {
            info!("voice session exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the served status current and push events to front-ends
        _ = async {
            loop {
                match forward_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "session event");
                        server.apply_event(&event).await;
                        // No subscribers is normal before a front-end attaches
                        let _ = notify_tx.send(Notification::Event(event));
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("session event forwarder exited");
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to register signal handlers"),
            }
        }
    }

    info!("shutting down...");

    session.shutdown();
    server.shutdown().await;

    info!("voice-session-daemon stopped");

    Ok(())
}
