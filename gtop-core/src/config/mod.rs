//! Validated runtime configuration shared between the server and the
//! background processors.
//!
//! The server crate parses the TOML file and builds these values; nothing in
//! this module touches the filesystem.

mod config_store;
mod notifications;
mod provider;
mod reconciler;
mod secrets;

pub use config_store::{ConfigStore, ConfigWatcher};
pub use notifications::{NotificationConfig, TelegramConfig};
pub use provider::ProviderConfig;
pub use reconciler::ReconcilerConfig;
pub use secrets::{InternalConfig, WebhookConfig};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Lifetime of cached per-game verification configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationCacheConfig {
    pub ttl: Duration,
}

impl Default for VerificationCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Shared configuration state with separate locks for each section.
///
/// Sections read on the request path are plain `Arc<RwLock<_>>`; the
/// reconciler settings live in a [`ConfigStore`] because the reconciler loop
/// has to wake up and reschedule when they change.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub internal: Arc<RwLock<InternalConfig>>,
    pub webhook: Arc<RwLock<WebhookConfig>>,
    pub notifications: Arc<RwLock<NotificationConfig>>,
    pub reconciler: ConfigStore<ReconcilerConfig>,
}
