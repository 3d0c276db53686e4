//! TOML file configuration structures.
//!
//! These structs directly map to the `gtop-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub internal: InternalConfig,
    pub webhook: WebhookConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Internal service secret. If this is plaintext (doesn't start with
/// `$argon2`), it will be hashed and the config file will be rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalConfig {
    pub secret: String,
}

/// Shared secret the payment gateway presents on webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub secret: String,
}

/// G2Bulk API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: Url,
    pub api_key: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            request_delay_ms: default_request_delay(),
            orphan_grace_secs: default_orphan_grace(),
        }
    }
}

fn default_interval() -> u64 {
    300
}

fn default_batch_size() -> i64 {
    50
}

fn default_request_delay() -> u64 {
    500
}

fn default_orphan_grace() -> u64 {
    600
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Bot API root; `https://api.telegram.org/` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

impl FileConfig {
    /// Check if the internal secret is already hashed (argon2 format).
    pub fn is_internal_secret_hashed(&self) -> bool {
        self.internal.secret.starts_with("$argon2")
    }
}
