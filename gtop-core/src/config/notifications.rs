//! Chat alert channel settings.

use url::Url;

/// Telegram bot used for operator alerts.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub api_base: Url,
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base.as_str())
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// `telegram: None` disables delivery; queued alerts are then only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationConfig {
    pub telegram: Option<TelegramConfig>,
}
