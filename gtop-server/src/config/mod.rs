//! Configuration module for gtop-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles internal secret hashing.

pub mod file;

use crate::config::file::FileConfig;
use gtop_core::config::{
    ConfigStore, InternalConfig, NotificationConfig, ProviderConfig, ReconcilerConfig,
    ServerConfig, SharedConfig, TelegramConfig, VerificationCacheConfig, WebhookConfig,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org/";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub internal: InternalConfig,
    pub webhook: WebhookConfig,
    pub provider: ProviderConfig,
    pub reconciler: ReconcilerConfig,
    pub notifications: NotificationConfig,
    pub verification: VerificationCacheConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    ///
    /// Provider and verification settings are not part of it; they are
    /// consumed once at startup.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(RwLock::new(self.server)),
            internal: Arc::new(RwLock::new(self.internal)),
            webhook: Arc::new(RwLock::new(self.webhook)),
            notifications: Arc::new(RwLock::new(self.notifications)),
            reconciler: ConfigStore::new(self.reconciler),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the internal secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;

        let secret_hash = if file_config.is_internal_secret_hashed() {
            file_config.internal.secret.clone()
        } else {
            let hash = hash_secret(&file_config.internal.secret)?;
            file_config.internal.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Internal secret hashed and config file updated");
            hash
        };

        build_loaded_config(file_config, secret_hash)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let required = [
        ("webhook.secret", config.webhook.secret.trim()),
        ("internal.secret", config.internal.secret.trim()),
        ("provider.api_key", config.provider.api_key.trim()),
    ];
    if let Some((name, _)) = required.iter().find(|(_, value)| value.is_empty()) {
        return Err(ConfigError::ValidationError(format!("{name} must not be empty")));
    }
    if config.reconciler.batch_size <= 0 {
        return Err(ConfigError::ValidationError(
            "reconciler.batch_size must be positive".to_string(),
        ));
    }
    if config.reconciler.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "reconciler.interval_secs must be positive".to_string(),
        ));
    }
    let incomplete_telegram = config
        .notifications
        .telegram
        .as_ref()
        .is_some_and(|t| t.bot_token.trim().is_empty() || t.chat_id.trim().is_empty());
    if incomplete_telegram {
        return Err(ConfigError::ValidationError(
            "notifications.telegram needs bot_token and chat_id".to_string(),
        ));
    }
    Ok(())
}

/// Hash a plaintext secret into an argon2 PHC string.
pub fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(
    file_config: FileConfig,
    secret_hash: String,
) -> Result<LoadedConfig, ConfigError> {
    let telegram = match file_config.notifications.telegram {
        Some(t) => Some(TelegramConfig {
            api_base: match t.api_base {
                Some(url) => url,
                None => Url::parse(DEFAULT_TELEGRAM_API)?,
            },
            bot_token: t.bot_token,
            chat_id: t.chat_id,
        }),
        None => None,
    };

    Ok(LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        internal: InternalConfig { secret_hash },
        webhook: WebhookConfig {
            secret: file_config.webhook.secret,
        },
        provider: ProviderConfig::new(
            file_config.provider.base_url,
            file_config.provider.api_key,
            Duration::from_secs(file_config.provider.timeout_secs),
        ),
        reconciler: ReconcilerConfig {
            interval: Duration::from_secs(file_config.reconciler.interval_secs),
            batch_size: file_config.reconciler.batch_size,
            request_delay: Duration::from_millis(file_config.reconciler.request_delay_ms),
            orphan_grace: Duration::from_secs(file_config.reconciler.orphan_grace_secs),
        },
        notifications: NotificationConfig { telegram },
        verification: VerificationCacheConfig {
            ttl: Duration::from_secs(file_config.verification.cache_ttl_secs),
        },
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const CONFIG: &str = r#"
[internal]
secret = "internal-secret"

[webhook]
secret = "webhook-secret"

[provider]
base_url = "https://api.g2bulk.com/v1"
api_key = "key"

[reconciler]
interval_secs = 120

[notifications.telegram]
bot_token = "123:abc"
chat_id = "-100"
"#;

    #[test]
    fn test_load_hashes_internal_secret_and_rewrites_file() {
        let file = write_config(CONFIG);
        let loader = ConfigLoader::new(file.path(), None);

        let loaded = loader.load().unwrap();
        assert!(loaded.internal.secret_hash.starts_with("$argon2"));
        assert_eq!(loaded.reconciler.interval, Duration::from_secs(120));
        assert_eq!(loaded.provider.base_url.as_str(), "https://api.g2bulk.com/v1/");
        assert_eq!(
            loaded.notifications.telegram.unwrap().api_base.as_str(),
            DEFAULT_TELEGRAM_API
        );

        let rewritten = std::fs::read_to_string(file.path()).unwrap();
        assert!(rewritten.contains(&loaded.internal.secret_hash));
        assert!(!rewritten.contains("internal-secret"));

        // a second load keeps the stored hash
        let again = loader.load().unwrap();
        assert_eq!(again.internal.secret_hash, loaded.internal.secret_hash);
    }

    #[test]
    fn test_listen_override() {
        let file = write_config(CONFIG);
        let listen: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let loaded = ConfigLoader::new(file.path(), Some(listen)).load().unwrap();
        assert_eq!(loaded.server.listen, listen);
    }

    #[test]
    fn test_empty_webhook_secret_fails_validation() {
        let file = write_config(&CONFIG.replace("webhook-secret", " "));
        let err = ConfigLoader::new(file.path(), None).load().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
