//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::Notify;

fn install(kind: SignalKind, name: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(signal = name, error = %e, "Failed to install signal handler");
            None
        }
    }
}

async fn recv(signal: &mut Option<Signal>) {
    match signal {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM");
    let mut sigint = install(SignalKind::interrupt(), "SIGINT");

    tokio::select! {
        _ = recv(&mut sigterm) => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = recv(&mut sigint) => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Listener, secrets, notification and reconciler settings are swapped in
/// place. Provider and verification cache settings are read once at startup.
///
/// Returns a Notify that stops the task.
pub fn spawn_config_reload_handler(
    state: AppState,
    config_loader: Arc<ConfigLoader>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = install(SignalKind::hangup(), "SIGHUP");

        loop {
            tokio::select! {
                _ = recv(&mut sighup) => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded) => {
                            *state.config.server.write().await = loaded.server;
                            *state.config.internal.write().await = loaded.internal;
                            *state.config.webhook.write().await = loaded.webhook;
                            *state.config.notifications.write().await = loaded.notifications;
                            state.config.reconciler.update(loaded.reconciler).await;
                            tracing::info!(
                                version = state.config.reconciler.version(),
                                "Configuration reloaded; provider and verification settings apply on restart"
                            );
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
