//! Shared secrets presented by callers of the gateway.

/// Secret protecting the internal routes (`X-Internal-Secret`).
///
/// Only the argon2 PHC string is kept in memory; the plaintext is hashed by
/// the config loader on first start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalConfig {
    pub secret_hash: String,
}

/// Secret the payment gateway presents on webhook deliveries.
///
/// Kept in plaintext because it is compared, not verified against a hash.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub secret: String,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}
