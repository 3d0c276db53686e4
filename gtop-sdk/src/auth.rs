//! Header names and credential helpers shared by the gateway and its callers.
//!
//! Three kinds of credentials exist:
//!
//! * **Webhook secret** (payment gateway → gateway webhook), carried either as
//!   `Authorization: Bearer {secret}` or as `X-Webhook-Secret: {secret}`.
//! * **Internal secret** (scheduler / auto-confirm → internal routes), carried
//!   as `X-Internal-Secret: {secret}`.
//! * **Session token** (storefront user → wallet/admin routes), carried as
//!   `Authorization: Bearer {token}`. Only the SHA-256 digest of a session
//!   token is ever stored or looked up.

use ring::{digest, hmac};

/// Standard authorization header.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Custom header the payment gateway may use instead of a bearer token.
pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Header carrying the internal service secret.
pub const INTERNAL_SECRET_HEADER: &str = "X-Internal-Secret";

/// Outcome of checking a presented shared secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretCheck {
    /// One of the presented credentials matches.
    Valid,
    /// No credential was presented at all.
    Missing,
    /// Credentials were presented but none matches.
    Mismatch,
}

/// Extract the token from an `Authorization: Bearer {token}` header value.
///
/// The scheme is matched case-insensitively. Empty tokens are rejected.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Compare two secrets in constant time.
///
/// Both sides are run through HMAC-SHA256 keyed with the expected secret and
/// the tags are compared with `ring`'s constant-time verifier, so neither the
/// content nor the length of `provided` leaks through timing.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, expected.as_bytes());
    let tag = hmac::sign(&key, provided.as_bytes());
    hmac::verify(&key, expected.as_bytes(), tag.as_ref()).is_ok()
}

/// Check the webhook credentials presented on a request.
///
/// * `authorization` – raw value of the `Authorization` header, if any.
/// * `custom` – raw value of the `X-Webhook-Secret` header, if any.
/// * `expected` – the configured webhook secret.
pub fn check_shared_secret(
    authorization: Option<&str>,
    custom: Option<&str>,
    expected: &str,
) -> SecretCheck {
    let presented: Vec<&str> = authorization
        .and_then(bearer_token)
        .into_iter()
        .chain(custom.map(str::trim).filter(|s| !s.is_empty()))
        .collect();

    if presented.is_empty() {
        return SecretCheck::Missing;
    }

    if presented.iter().any(|p| secrets_match(p, expected)) {
        SecretCheck::Valid
    } else {
        SecretCheck::Mismatch
    }
}

/// SHA-256 digest of a session token, as stored in `user_sessions.token_hash`.
pub fn hash_session_token(token: &str) -> Vec<u8> {
    digest::digest(&digest::SHA256, token.as_bytes())
        .as_ref()
        .to_vec()
}
